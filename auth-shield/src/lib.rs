//! Field-level authorization for graph query pipelines
//!
//! Rules are bound to (type, field) pairs of a schema and decide, per
//! request and per field actually selected, whether the caller may resolve
//! that field:
//! - A combinator algebra (`allow`, `deny`, `and`, `or`, `chain`, `race`,
//!   `error`, `execution`, `input`, `validation`) for writing rules
//! - A per-request evaluation cache so a rule runs at most once per field
//!   occurrence in each enforcement phase
//! - Three enforcement points wired into the host pipeline: resolver guards
//!   on the schema, input requirements merged at parse time, and a document
//!   walk that rejects the whole request before execution
//!
//! # Decisions
//!
//! - **Allow**: the field resolves normally
//! - **Deny**: the rule declined; reported with code `FORBIDDEN`
//! - **Error**: the rule itself failed; reported with code `RULE_ERROR`
//!
//! # Example
//!
//! ```rust
//! use auth_shield::{and, allow, deny, execution, use_shield, RuleSpec, ShieldOptions};
//! use query_pipeline::{Arguments, FieldDefinition, ObjectType, Pipeline, Request, Schema, TypeRef};
//! use serde_json::{json, Value};
//!
//! struct Session {
//!     user: Option<String>,
//! }
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let schema = Schema::<Session>::builder()
//!     .query(
//!         ObjectType::new("Query")
//!             .field(
//!                 FieldDefinition::new("secret", TypeRef::named("String"))
//!                     .resolve(|_| async { Ok(json!("s3cr3t")) }),
//!             )
//!             .field(
//!                 FieldDefinition::new("motd", TypeRef::named("String"))
//!                     .resolve(|_| async { Ok(json!("hello")) }),
//!             ),
//!     )
//!     .build()?;
//!
//! let signed_in = execution(|session: &Session, _: &Arguments, _: &Value| session.user.is_some());
//! let rules = RuleSpec::new()
//!     .field("Query", "secret", and(vec![allow(), signed_in]))
//!     .fallback(deny("Closed"));
//!
//! let pipeline = Pipeline::builder(schema)
//!     .plugin(use_shield(rules, ShieldOptions::default()))
//!     .build()?;
//!
//! let result = pipeline
//!     .execute(Request::new("{ secret }", Session { user: None }))
//!     .await;
//! assert!(result.data.is_none());
//! # Ok(())
//! # }
//! ```

pub mod augment;
pub mod cache;
pub mod combinators;
pub mod context;
pub mod decision;
pub mod error;
pub mod instrument;
pub mod options;
pub mod plugin;
pub mod rule;
pub mod rule_map;
pub mod validate;

pub use augment::{augment, wrap_parse};
pub use cache::*;
pub use combinators::{allow, and, chain, deny, error, execution, execution_async, input, or, race, validation};
pub use context::*;
pub use decision::*;
pub use error::*;
pub use instrument::{instrument, INSTRUMENTATION_TAG};
pub use options::*;
pub use plugin::*;
pub use rule::*;
pub use rule_map::*;
pub use validate::validate;
