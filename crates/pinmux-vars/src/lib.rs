//! Typed configuration variables and the expressions derived from them.
//!
//! Variables live in a [`VariableStore`]. Formulas compiled by the store
//! subscribe to the variables they read and can be bound to other variables
//! as a derived value, an enable or hide condition, or an error condition.
//! Changes propagate synchronously and depth-first.

pub mod choice;
pub mod error;
pub mod expr;
pub mod expression;
pub mod settings;
pub mod store;
pub mod value;
pub mod variable;

pub use choice::ChoiceData;
pub use error::{EvalError, SettingsError, VarError};
pub use expression::{Binding, ExprId, Expression, Role};
pub use settings::{Settings, SettingsFile};
pub use store::{Effect, EngineNode, VarId, VariableStore};
pub use value::Value;
pub use variable::{Formattable, Persistable, Validatable, Variable, VariableKind};
