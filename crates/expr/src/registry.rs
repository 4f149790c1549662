//! Operator registry.
//!
//! Maps operator names to scalar builders and aggregate factories. The
//! built-in table covers the operators the query builder emits; both
//! tables stay open so applications can register their own.

use crate::aggregate::{Accumulator, AvgAcc, CollectAcc, CountAcc, MaxAcc, MinAcc, SumAcc};
use crate::compile::{install_builtins, Evaluator};
use crate::error::CompileError;
use hashbrown::HashMap;
use std::rc::Rc;

/// Builds an evaluator from already-compiled argument evaluators.
/// Arity validation belongs to the builder.
pub type ScalarBuilder = Rc<dyn Fn(Vec<Evaluator>) -> Result<Evaluator, CompileError>>;

/// Produces a fresh accumulator for one group.
pub type AggregateFactory = Rc<dyn Fn() -> Box<dyn Accumulator>>;

/// Named scalar operators and aggregates.
pub struct OperatorRegistry {
    scalars: HashMap<String, ScalarBuilder>,
    aggregates: HashMap<String, AggregateFactory>,
}

impl OperatorRegistry {
    /// An empty registry with no operators at all.
    pub fn empty() -> Self {
        Self {
            scalars: HashMap::new(),
            aggregates: HashMap::new(),
        }
    }

    /// A registry pre-populated with the built-in operators and
    /// aggregates.
    pub fn with_builtins() -> Self {
        let mut registry = Self::empty();
        install_builtins(&mut registry);

        registry.register_aggregate("count", || Box::new(CountAcc::default()));
        registry.register_aggregate("sum", || Box::new(SumAcc::default()));
        registry.register_aggregate("avg", || Box::new(AvgAcc::default()));
        registry.register_aggregate("min", || Box::new(MinAcc::numeric()));
        registry.register_aggregate("max", || Box::new(MaxAcc::numeric()));
        registry.register_aggregate("minStr", || Box::new(MinAcc::strings()));
        registry.register_aggregate("maxStr", || Box::new(MaxAcc::strings()));
        registry.register_aggregate("collect", || Box::new(CollectAcc::default()));
        registry
    }

    /// Registers (or replaces) a scalar operator.
    pub fn register_scalar(
        &mut self,
        name: impl Into<String>,
        builder: impl Fn(Vec<Evaluator>) -> Result<Evaluator, CompileError> + 'static,
    ) {
        self.scalars.insert(name.into(), Rc::new(builder));
    }

    /// Registers (or replaces) an aggregate.
    pub fn register_aggregate(
        &mut self,
        name: impl Into<String>,
        factory: impl Fn() -> Box<dyn Accumulator> + 'static,
    ) {
        self.aggregates.insert(name.into(), Rc::new(factory));
    }

    /// Looks up a scalar operator builder.
    pub fn scalar(&self, name: &str) -> Option<&ScalarBuilder> {
        self.scalars.get(name)
    }

    /// Looks up an aggregate factory.
    pub fn aggregate(&self, name: &str) -> Option<&AggregateFactory> {
        self.aggregates.get(name)
    }
}

impl Default for OperatorRegistry {
    fn default() -> Self {
        Self::with_builtins()
    }
}
