//! Overload sets and first-match resolution.
//!
//! Candidates are tried in declaration order. A candidate is rejected on
//! an arity mismatch before any argument is looked at, and otherwise at its
//! first parameter that does not coerce. The first candidate whose every
//! parameter coerces wins, even if a later one would fit more closely.

use hostbridge_core::{BridgeError, NativeFn, NativeValue, Rejection, ScriptValue, Signature};

use crate::CoercionScope;

/// One declared candidate: its signature and its native body.
#[derive(Debug, Clone)]
pub struct Overload {
    pub signature: Signature,
    pub func: NativeFn,
}

impl Overload {
    /// Create an overload.
    pub fn new(signature: Signature, func: NativeFn) -> Self {
        Self { signature, func }
    }

    /// Check one candidate against the arguments.
    ///
    /// Hidden parameters are filled by their typemap and consume no
    /// argument, so the arity checked is the number of visible ones.
    /// Rejection indices count script arguments.
    pub fn try_match(&self, scope: &CoercionScope<'_>, args: &[ScriptValue]) -> Result<Vec<NativeValue>, Rejection> {
        let params = &self.signature.params;
        let expected = params.iter().map(|kind| scope.inputs(kind)).sum();
        if expected != args.len() {
            return Err(Rejection::Arity {
                expected,
                got: args.len(),
            });
        }
        let mut next = 0;
        let mut coerced = Vec::with_capacity(params.len());
        for kind in params {
            if scope.inputs(kind) == 0 {
                let value = scope
                    .coerce(&ScriptValue::Undefined, kind)
                    .map_err(|failure| Rejection::Param { index: next, failure })?;
                coerced.push(value);
                continue;
            }
            let value = scope
                .coerce(&args[next], kind)
                .map_err(|failure| Rejection::Param { index: next, failure })?;
            coerced.push(value);
            next += 1;
        }
        Ok(coerced)
    }
}

/// The candidate chosen for a call.
#[derive(Debug)]
pub struct Resolved<'a> {
    /// Position of the candidate in declaration order
    pub index: usize,
    /// The candidate itself
    pub overload: &'a Overload,
    /// Coerced arguments
    pub args: Vec<NativeValue>,
}

/// All declared candidates sharing one externally visible name.
#[derive(Debug, Clone)]
pub struct OverloadSet {
    name: String,
    overloads: Vec<Overload>,
}

impl OverloadSet {
    /// Create an empty overload set.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            overloads: Vec::new(),
        }
    }

    /// Append a candidate. Declaration order is resolution order.
    pub fn push(&mut self, overload: Overload) {
        self.overloads.push(overload);
    }

    /// Builder form of [`OverloadSet::push`].
    pub fn with(mut self, overload: Overload) -> Self {
        self.push(overload);
        self
    }

    /// Name used in diagnostics.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Candidates in declaration order.
    pub fn overloads(&self) -> &[Overload] {
        &self.overloads
    }

    /// Number of candidates.
    pub fn len(&self) -> usize {
        self.overloads.len()
    }

    /// Check if there are no candidates.
    pub fn is_empty(&self) -> bool {
        self.overloads.is_empty()
    }

    /// Pick the first candidate that accepts `args`.
    ///
    /// When no candidate does, a lone candidate (or the only candidate of
    /// the call's arity) reports its own failure; otherwise every rejection
    /// is reported in declaration order.
    pub fn resolve<'s>(&'s self, scope: &CoercionScope<'_>, args: &[ScriptValue]) -> Result<Resolved<'s>, BridgeError> {
        if self.overloads.is_empty() {
            return Err(BridgeError::UnknownCallable {
                name: self.name.clone(),
            });
        }

        let mut rejections = Vec::with_capacity(self.overloads.len());
        for (index, overload) in self.overloads.iter().enumerate() {
            match overload.try_match(scope, args) {
                Ok(coerced) => {
                    tracing::trace!(target: "hostbridge::resolve", callable = %self.name, index, "selected overload");
                    return Ok(Resolved {
                        index,
                        overload,
                        args: coerced,
                    });
                }
                Err(rejection) => {
                    tracing::trace!(target: "hostbridge::resolve", callable = %self.name, index, %rejection, "rejected overload");
                    rejections.push(rejection);
                }
            }
        }

        let same_arity: Vec<usize> = rejections
            .iter()
            .enumerate()
            .filter(|(_, r)| !matches!(r, Rejection::Arity { .. }))
            .map(|(i, _)| i)
            .collect();
        let lone = match (rejections.len(), same_arity.as_slice()) {
            (1, _) => Some(0),
            (_, [only]) => Some(*only),
            _ => None,
        };
        let error = match lone {
            Some(index) => self.single_failure(&rejections[index]),
            None => BridgeError::NoMatchingOverload {
                callable: self.name.clone(),
                rejections,
            },
        };
        tracing::debug!(target: "hostbridge::resolve", %error, "no overload matched");
        Err(error)
    }

    fn single_failure(&self, rejection: &Rejection) -> BridgeError {
        match rejection {
            Rejection::Arity { expected, got } => BridgeError::ArityMismatch {
                callable: self.name.clone(),
                expected: *expected,
                got: *got,
            },
            Rejection::Param { index, failure } => BridgeError::Coercion {
                callable: self.name.clone(),
                index: *index,
                failure: failure.clone(),
            },
        }
    }
}
