//! Minimal graph query host
//!
//! This crate is the host side that authorization plugins are written
//! against. It provides:
//! - A schema type system with async, resolver-backed fields
//! - An owned query document AST, parsed with `graphql-parser`
//! - Field collection shared by execution and any document walker
//! - An executor with concurrent field resolution and null propagation
//! - A plugin lifecycle: schema ready, parse, execute
//!
//! # Example
//!
//! ```rust
//! use query_pipeline::{FieldDefinition, ObjectType, Pipeline, Request, Schema, TypeRef};
//! use serde_json::json;
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let schema = Schema::<()>::builder()
//!     .query(ObjectType::new("Query").field(
//!         FieldDefinition::new("ping", TypeRef::named("String"))
//!             .resolve(|_| async { Ok(json!("pong")) }),
//!     ))
//!     .build()?;
//!
//! let pipeline = Pipeline::builder(schema).build()?;
//! let result = pipeline.execute(Request::new("{ ping }", ())).await;
//! assert!(result.is_ok());
//! # Ok(())
//! # }
//! ```

pub mod document;
pub mod error;
pub mod executor;
pub mod parser;
pub mod path;
pub mod pipeline;
pub mod plugin;
pub mod response;
pub mod schema;

pub use document::*;
pub use error::*;
pub use parser::{default_parse_fn, parse_document, parse_selection_set, ParseFn};
pub use path::*;
pub use pipeline::*;
pub use plugin::*;
pub use response::*;
pub use schema::*;
