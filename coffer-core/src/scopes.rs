//! Scope matching for authorization decisions.
//!
//! A scope is an opaque permission token such as `secrets:get:prod/db-password`.
//! Held scopes may end in `*`, which makes them prefix patterns covering every
//! scope that shares the leading characters. An operation's requirement is a
//! disjunction of conjunctions: the caller qualifies when every scope in at
//! least one bundle is covered by something it holds.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Returns true when `pattern` covers `scope`.
///
/// A trailing `*` matches any scope sharing the preceding prefix, so `a:b:*`
/// covers `a:b:c:d` and `a:b:x` but not `a:bc`. A `*` anywhere else is
/// literal, and patterns without one require exact equality.
pub fn scope_match(pattern: &str, scope: &str) -> bool {
    match pattern.strip_suffix('*') {
        Some(prefix) => scope.starts_with(prefix),
        None => pattern == scope,
    }
}

/// Required scopes for an operation, as a disjunction of conjunctions.
///
/// The outer list is OR, the inner lists are AND. An empty outer list can
/// never be satisfied.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ScopeExpression(pub Vec<Vec<String>>);

impl ScopeExpression {
    /// Expression satisfied by a single scope.
    pub fn single(scope: impl Into<String>) -> Self {
        ScopeExpression(vec![vec![scope.into()]])
    }

    /// Expression requiring every scope in `bundle` at once.
    pub fn all_of<I, S>(bundle: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        ScopeExpression(vec![bundle.into_iter().map(Into::into).collect()])
    }
}

impl fmt::Display for ScopeExpression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.is_empty() {
            return write!(f, "(unsatisfiable)");
        }
        for (i, bundle) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, " or ")?;
            }
            if bundle.len() == 1 {
                write!(f, "{}", bundle[0])?;
            } else {
                write!(f, "({})", bundle.join(" and "))?;
            }
        }
        Ok(())
    }
}

/// Decides whether `held` scopes satisfy a required expression.
///
/// Held scopes act as the patterns: a caller holding `secrets:get:captain:*`
/// covers the required scope `secrets:get:captain:foo`. There is no partial
/// credit within a bundle.
pub fn satisfies(held: &[String], required: &ScopeExpression) -> bool {
    required.0.iter().any(|bundle| {
        bundle
            .iter()
            .all(|needed| held.iter().any(|pattern| scope_match(pattern, needed)))
    })
}
