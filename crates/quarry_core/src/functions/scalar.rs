use std::fmt::{self, Debug};
use std::sync::Arc;

use super::ReturnField;
use crate::errors::Result;
use crate::schema::Field;
use crate::value::Value;

/// A function evaluated once per row.
pub trait ScalarFunction: Debug + Sync + Send {
    fn name(&self) -> &str;

    /// Output field given the fields of the arguments.
    fn return_field(&self, args: &[Field]) -> Result<Field>;

    fn invoke(&self, args: &[Value]) -> Result<Value>;
}

pub type ScalarFn = Arc<dyn Fn(&[Value]) -> Result<Value> + Sync + Send>;

/// Scalar function backed by a closure.
#[derive(Clone)]
pub struct SimpleScalarFunction {
    name: String,
    returns: ReturnField,
    func: ScalarFn,
}

impl SimpleScalarFunction {
    pub fn new<F>(name: impl Into<String>, returns: ReturnField, func: F) -> Self
    where
        F: Fn(&[Value]) -> Result<Value> + Sync + Send + 'static,
    {
        SimpleScalarFunction {
            name: name.into(),
            returns,
            func: Arc::new(func),
        }
    }
}

impl Debug for SimpleScalarFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SimpleScalarFunction")
            .field("name", &self.name)
            .field("returns", &self.returns)
            .finish_non_exhaustive()
    }
}

impl ScalarFunction for SimpleScalarFunction {
    fn name(&self) -> &str {
        &self.name
    }

    fn return_field(&self, args: &[Field]) -> Result<Field> {
        self.returns.resolve(args)
    }

    fn invoke(&self, args: &[Value]) -> Result<Value> {
        (self.func)(args)
    }
}
