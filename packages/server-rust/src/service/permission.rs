//! Caller authorization against an action's declared requirement.

use actionhub_core::{identifier_of, Caller, InvocationError};

use super::descriptor::{ActionDescriptor, Permission, ServiceDescriptor};
use super::operation::{InvocationContext, ResolvedModel};

/// Decides allow/deny for a caller.
///
/// The administrator role bypasses role, ownership and admin-only checks,
/// but never the requirement that a needed model exists.
#[derive(Debug, Clone)]
pub struct PermissionGate {
    admin_role: String,
}

impl PermissionGate {
    pub fn new(admin_role: impl Into<String>) -> Self {
        Self {
            admin_role: admin_role.into(),
        }
    }

    #[must_use]
    pub fn admin_role(&self) -> &str {
        &self.admin_role
    }

    /// Checks the caller of a live call, attaching the requested identifier
    /// to `ModelNotFound` failures.
    ///
    /// # Errors
    ///
    /// See [`PermissionGate::check`].
    pub fn check_context(&self, ctx: &InvocationContext) -> Result<(), InvocationError> {
        self.check(&ctx.service, &ctx.action, &ctx.caller, ctx.model.as_ref())
            .map_err(|err| match err {
                InvocationError::ModelNotFound { service, id: None } => {
                    let id = ctx
                        .param(ctx.service.options().id_param_name())
                        .or_else(|| ctx.param("id"))
                        .or_else(|| ctx.param("code"))
                        .and_then(identifier_of);
                    InvocationError::ModelNotFound { service, id }
                }
                other => other,
            })
    }

    /// # Errors
    ///
    /// - `ModelNotFound` if the action needs a model and no lookup ran or a
    ///   point lookup found nothing
    /// - `Forbidden` if identity, role, admin or ownership requirements fail
    pub fn check(
        &self,
        service: &ServiceDescriptor,
        action: &ActionDescriptor,
        caller: &Caller,
        model: Option<&ResolvedModel>,
    ) -> Result<(), InvocationError> {
        let needs_model = action.need_model || action.permission == Permission::Owner;
        // A set lookup that matched nothing is still a resolved model.
        if model.is_none() && needs_model {
            return Err(InvocationError::ModelNotFound {
                service: service.name().to_string(),
                id: None,
            });
        }

        if caller.has_role(&self.admin_role) {
            return Ok(());
        }

        match action.permission {
            Permission::Public => {}
            Permission::Authenticated => Self::require_identity(caller)?,
            Permission::Admin => {
                return Err(InvocationError::forbidden(format!(
                    "{} requires the {} role",
                    action.qualified_name, self.admin_role
                )))
            }
            Permission::Owner => {
                Self::require_identity(caller)?;
                if let Some(model) = model {
                    Self::require_ownership(service, caller, model)?;
                }
            }
        }

        if let Some(role) = &action.role {
            if !caller.has_role(role) {
                return Err(InvocationError::forbidden(format!(
                    "{} requires the {role} role",
                    action.qualified_name
                )));
            }
        }
        Ok(())
    }

    fn require_identity(caller: &Caller) -> Result<(), InvocationError> {
        if caller.is_authenticated() {
            Ok(())
        } else {
            Err(InvocationError::forbidden("authentication required"))
        }
    }

    /// Every resolved entity must name the caller in the owner field.
    fn require_ownership(
        service: &ServiceDescriptor,
        caller: &Caller,
        model: &ResolvedModel,
    ) -> Result<(), InvocationError> {
        let field = &service.options().owner_field;
        let owns_all = model.entities().all(|entity| {
            entity
                .get(field)
                .and_then(identifier_of)
                .is_some_and(|owner| caller.id.as_deref() == Some(owner.as_str()))
        });
        if owns_all {
            Ok(())
        } else {
            Err(InvocationError::forbidden("caller does not own the entity"))
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
