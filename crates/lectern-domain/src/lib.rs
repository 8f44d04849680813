//! Lectern Domain Layer
//!
//! This crate contains the domain model for Lectern, a schema-driven
//! literature screening pipeline. It defines the configuration-declared
//! schema, the article and extraction types that flow through the pipeline,
//! the destination table layout, and the trait interfaces that all other
//! layers depend upon.
//!
//! ## Key Concepts
//!
//! - **Schema**: research question template, input parameters and output
//!   features, frozen after validation
//! - **Binding**: one combination of input values the question is asked for
//! - **Article**: ordered sections plus format metadata
//! - **ExtractionRecord**: validated model output for one (binding, article) pair
//! - **TableLayout / TableRow**: the on-disk row format, keyed by the bound
//!   input values and the article id
//!
//! ## Architecture
//!
//! - No I/O, only serde for configuration
//! - Infrastructure implementations live in other crates
//! - Trait definitions for all external interactions

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod article;
pub mod row;
pub mod schema;
pub mod template;
pub mod traits;
pub mod value;

// Re-exports for convenience
pub use article::{Article, ArticleFormat, Section, SectionId};
pub use row::{
    ColumnDef, ColumnRole, ColumnType, ColumnValue, MetadataColumn, RowKey, TableLayout, TableRow,
};
pub use schema::{
    AllowedValue, Binding, BoundValue, DataType, Example, InputParameter, InputValue,
    OutputFeature, Schema, SchemaDefinition, SchemaError,
};
pub use template::{RenderError, Template, TemplateSyntaxError};
pub use traits::{ArticleSource, DocumentParser, LlmProvider, Retryable, RowStore, UpsertAck};
pub use value::{ExtractedField, Extracted, ExtractionRecord, FieldValue, FieldWarning};
