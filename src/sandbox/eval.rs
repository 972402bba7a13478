use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serde_json::{Map, Value};

use super::helpers;
use super::script::{Expr, Stmt};
use crate::error::{SandboxError, SandboxResult};

/// Deepest array/object nesting a bound variable may reach.
pub const MAX_VALUE_DEPTH: usize = 128;
/// Most array/object entries a bound variable may hold.
pub const MAX_VALUE_NODES: usize = 1_000_000;

/// Fuel and cancellation bookkeeping for one evaluation.
pub struct Meter {
    remaining: u64,
    limit: u64,
    cancel: Arc<AtomicBool>,
    timeout_ms: u64,
}

impl Meter {
    /// Meter with `limit` fuel that stops once `cancel` is set.
    pub fn new(limit: u64, cancel: Arc<AtomicBool>, timeout_ms: u64) -> Self {
        Self {
            remaining: limit,
            limit,
            cancel,
            timeout_ms,
        }
    }

    /// Spend `cost` fuel.
    pub fn charge(&mut self, cost: u64) -> SandboxResult<()> {
        if self.cancel.load(Ordering::Relaxed) {
            return Err(SandboxError::Cancelled {
                timeout_ms: self.timeout_ms,
            });
        }
        if cost > self.remaining {
            self.remaining = 0;
            return Err(SandboxError::FuelExhausted { limit: self.limit });
        }
        self.remaining -= cost;
        Ok(())
    }

    /// Fuel spent so far.
    pub fn used(&self) -> u64 {
        self.limit - self.remaining
    }
}

/// Tree-walking evaluator over a variable environment.
pub struct Interpreter {
    env: HashMap<String, Value>,
    meter: Meter,
}

impl Interpreter {
    /// Interpreter with `bindings` in scope.
    pub fn new(bindings: HashMap<String, Value>, meter: Meter) -> Self {
        Self {
            env: bindings,
            meter,
        }
    }

    /// Run every statement, returning the final environment.
    pub fn exec(mut self, program: &[Stmt]) -> SandboxResult<HashMap<String, Value>> {
        for stmt in program {
            self.meter.charge(1)?;
            let (name, expr) = match stmt {
                Stmt::Let { name, expr, .. } | Stmt::Assign { name, expr, .. } => (name, expr),
            };
            let value = self.eval(expr)?;
            check_shape(name, &value)?;
            self.env.insert(name.clone(), value);
        }
        tracing::debug!(fuel_used = self.meter.used(), "Chart script finished");
        Ok(self.env)
    }

    fn eval(&mut self, expr: &Expr) -> SandboxResult<Value> {
        self.meter.charge(1)?;

        match expr {
            Expr::Literal(value) => Ok(value.clone()),
            Expr::Var(name) => self
                .env
                .get(name)
                .cloned()
                .ok_or_else(|| SandboxError::UnboundVariable { name: name.clone() }),
            Expr::Array(items) => {
                let mut values = Vec::with_capacity(items.len());
                for item in items {
                    values.push(self.eval(item)?);
                }
                Ok(Value::Array(values))
            }
            Expr::Object(entries) => {
                let mut map = Map::new();
                for (key, item) in entries {
                    let value = self.eval(item)?;
                    map.insert(key.clone(), value);
                }
                Ok(Value::Object(map))
            }
            Expr::Call { name, args } => {
                if !helpers::HELPERS.contains(&name.as_str()) {
                    return Err(SandboxError::UnknownHelper { name: name.clone() });
                }
                let mut values = Vec::with_capacity(args.len());
                for arg in args {
                    values.push(self.eval(arg)?);
                }
                helpers::call(name, values, &mut self.meter)
            }
            Expr::Field { target, path } => {
                let mut current = self.eval(target)?;
                for (i, name) in path.iter().enumerate() {
                    self.meter.charge(1)?;
                    current = match current {
                        Value::Object(mut map) => map.remove(name).unwrap_or(Value::Null),
                        Value::Null => return Ok(Value::Null),
                        other => {
                            return Err(SandboxError::Type {
                                context: format!(".{}", path[..=i].join(".")),
                                message: format!("cannot read a field of {}", other),
                            })
                        }
                    };
                }
                Ok(current)
            }
        }
    }
}

/// Reject values nested or sized past what later stages can walk.
fn check_shape(name: &str, value: &Value) -> SandboxResult<()> {
    let mut stack = vec![(value, 1usize)];
    let mut nodes = 0usize;

    while let Some((value, depth)) = stack.pop() {
        if depth > MAX_VALUE_DEPTH {
            return Err(SandboxError::TooDeep {
                variable: name.to_string(),
                limit: MAX_VALUE_DEPTH,
            });
        }
        let children: Box<dyn Iterator<Item = &Value> + '_> = match value {
            Value::Array(items) => Box::new(items.iter()),
            Value::Object(map) => Box::new(map.values()),
            _ => continue,
        };
        for child in children {
            nodes += 1;
            if nodes > MAX_VALUE_NODES {
                return Err(SandboxError::TooLarge {
                    what: format!("'{}' entry count", name),
                    size: nodes,
                    limit: MAX_VALUE_NODES,
                });
            }
            stack.push((child, depth + 1));
        }
    }
    Ok(())
}
