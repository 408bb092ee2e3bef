//! Data type chains for cfgraph.
//!
//! A configuration item's type is a single-parent chain of [`DataType`]
//! links ending at the primitive root. The chain provides validation,
//! coercion and normalization, plus metadata (sensitivity, required-ness,
//! usage phase, env keys) that children inherit unless they override it.
//!
//! Parent references are written as a [`TypeRef`] (an instance, an
//! uninitialized factory, or a registered name) and resolved once by a
//! [`TypeRegistry`] into a concrete `Arc<DataType>`.

pub mod builtins;
pub mod data_type;
pub mod error;
pub mod metadata;
pub mod registry;
pub mod type_ref;
pub mod value;

pub use data_type::{
    AncestorOrder, CoerceFn, DataType, DataTypeBuilder, NormalizeFn, PRIMITIVE_LABEL, ValidateFn,
};
pub use error::{CoercionError, Result, TypeError, ValidationCode, ValidationError};
pub use metadata::{TypeMetadata, UsePhase};
pub use registry::TypeRegistry;
pub use type_ref::{TypeFactory, TypeRef};
pub use value::{infer_type, is_empty, value_kind};
