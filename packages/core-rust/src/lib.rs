//! `ActionHub` Core: caller identity, route descriptors, population schemas,
//! the invocation error taxonomy, and transport wire envelopes.

pub mod context;
pub mod error;
pub mod messages;
pub mod route;
pub mod schema;
pub mod types;

pub use context::{Caller, Transport, DEFAULT_ADMIN_ROLE};
pub use error::{ErrorBody, InvocationError};
pub use messages::{
    decode_request, encode_reply, ChannelReply, ChannelRequest, FrameEncoding, QueryError,
    QueryRequest, QueryResponse,
};
pub use route::{
    ChannelRoute, HttpMethod, ResolverBinding, ResolverRoot, RouteDescriptor, RouteSet,
};
pub use schema::{FieldFilter, PopulationSchema};
pub use types::{entity_id, identifier_of, param_flag, Entity, Params, StorageValue, ID_FIELD};
