//! Reference templates.
//!
//! Templates are declarative data: YAML or JSON files validated against a
//! JSON Schema, then checked for the invariants every scoring run relies on.

mod parser;
mod registry;
mod schema;

pub use parser::{
    CardinalityRule, ConfigurationError, FieldSpec, FieldType, PartitionRule, RootType,
    SectionSchema, Template, UniquenessRule, WEIGHT_TOLERANCE,
};
pub use registry::{
    DirectoryTemplateSource, TemplateRegistry, TemplateRegistryBuilder, TemplateSource,
    BUILTIN_TEMPLATE, RENDER_PLAN_TEMPLATE,
};
pub use schema::validate_template_schema;
