//! `quickgraph`: a schema-less, code-first GraphQL execution engine.
//!
//! Application types describe their own GraphQL shape via [`Describe`]
//! (hand-written for a handful of scalars, or `#[derive(GraphQLObject)]` /
//! `#[derive(GraphQLEnum)]` from `quickgraph_derive` for everything else) —
//! there is no separate schema file to keep in sync. An [`Engine`] is built
//! up by registering queries, mutations, subscriptions, and method
//! resolvers against that type graph, then [`Engine::finish`] hands back a
//! [`GraphEngine`] that answers [`GraphEngine::process_request`].
//!
//! ```ignore
//! let mut engine: Engine<AppContext> = Engine::default();
//! engine.register_query1("course", Some(["id"]), |ctx, id: String| async move {
//!     ctx.courses.find(&id).await
//! });
//! let engine = engine.finish();
//! let (response, _first_error) = engine.process_request(ctx, query, "{}").await;
//! ```

pub mod ast;
pub mod engine;
pub mod error;
pub mod executor;
pub mod parser;
pub mod planner;
pub mod registry;
pub mod schema;
pub mod value;

pub use engine::{Engine, EngineConfig, GraphEngine, NoArgs, NoContext};
pub use error::{ErrorCategory, ErrorHandler, GraphError, Location, PathSegment};
pub use executor::RequestContext;
pub use quickgraph_derive::{GraphQLEnum, GraphQLObject};
pub use registry::describe::Describe;
pub use registry::function_registry::ArgsMeta;
pub use registry::ScalarHooks;
pub use value::{Object, Value};
