//! Stock action handlers.

use std::sync::Arc;

use actionhub_core::InvocationError;

use super::descriptor::ActionHandler;
use super::operation::{ActionOutput, InvocationContext};

/// Returns the resolved model, populated according to the call's
/// `populate` parameter.
///
/// Pair with `ActionMeta::need_model` so the pipeline resolves the model
/// first; without a model the handler returns `ModelNotFound`.
#[must_use]
pub fn fetch_model() -> impl ActionHandler {
    |ctx: Arc<InvocationContext>| async move {
        let Some(model) = ctx.model.clone() else {
            return Err(InvocationError::ModelNotFound {
                service: ctx.service.name().to_string(),
                id: None,
            });
        };
        let value = ctx.populate(model.into_value()).await?;
        Ok(ActionOutput::Raw(value))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use actionhub_core::{Caller, Entity, Params, Transport};
    use async_trait::async_trait;
    use serde_json::{json, Value};

    use super::*;
    use crate::service::descriptor::{ActionMeta, ActionSpec, ServiceDescriptor};
    use crate::service::operation::{Invocation, ResolvedModel, SubInvoker};

    struct NoCalls;

    #[async_trait]
    impl SubInvoker for NoCalls {
        async fn invoke_internal(
            &self,
            action: &str,
            _params: Params,
            _caller: &Caller,
        ) -> Result<Value, InvocationError> {
            Err(InvocationError::UnknownAction {
                name: action.to_string(),
            })
        }
    }

    fn context(model: Option<ResolvedModel>) -> Arc<InvocationContext> {
        let service = Arc::new(
            ServiceDescriptor::builder("docs")
                .action("get", ActionSpec::full(fetch_model(), ActionMeta::new().need_model()))
                .build()
                .unwrap(),
        );
        let action = Arc::clone(service.action("get").unwrap());
        let invocation = Invocation::new("docs.get", Params::new(), Caller::anonymous(), Transport::Http);
        let mut ctx = InvocationContext::new(1, invocation, service, action, Arc::new(NoCalls));
        ctx.model = model;
        Arc::new(ctx)
    }

    #[tokio::test]
    async fn returns_model_as_raw() {
        let entity: Entity = serde_json::from_value(json!({"id": "a", "tags": ["t1"]})).unwrap();
        let ctx = context(Some(ResolvedModel::One(entity)));
        let handler = fetch_model();

        let out = handler.handle(ctx).await.unwrap();
        assert_eq!(out, ActionOutput::Raw(json!({"id": "a", "tags": ["t1"]})));
    }

    #[tokio::test]
    async fn missing_model_is_not_found() {
        let err = fetch_model().handle(context(None)).await.unwrap_err();
        assert!(matches!(err, InvocationError::ModelNotFound { .. }));
    }
}
