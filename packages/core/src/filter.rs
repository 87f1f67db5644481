//! Filters and the expression-language seam.
//!
//! The filter object model (pass, fid sets, boolean combinators) lives
//! here; parsing a CQL-like expression text is delegated to an external
//! parser that returns an opaque predicate evaluator.

use std::collections::BTreeSet;
use std::sync::{Arc, RwLock};

use lazy_static::lazy_static;
use serde_json::Value as Json;

use geostore_driver::{RawFeature, RecordPredicate};

use crate::registry::{Entry, TypeRegistry};
use crate::Error;

/// An opaque parsed predicate, produced by the expression collaborator.
pub trait PredicateHandle: Send + Sync {
    fn evaluate(&self, record: &RawFeature) -> bool;

    /// The expression text, round-trippable where the grammar allows.
    fn to_text(&self) -> String;
}

/// The expression-language collaborator contract.
pub trait ExpressionParser: Send + Sync {
    fn parse(&self, text: &str) -> Result<Arc<dyn PredicateHandle>, Error>;
}

/// A parser stub for deployments without an expression language wired in.
pub struct NoParser;

impl ExpressionParser for NoParser {
    fn parse(&self, text: &str) -> Result<Arc<dyn PredicateHandle>, Error> {
        Err(Error::filter(format!(
            "no expression parser configured (cannot parse '{}')",
            text
        )))
    }
}

/// A constraint over features.
#[derive(Clone)]
pub enum Filter {
    /// Matches everything. The default for queries.
    Pass,
    /// Matches features whose id is in the set.
    Fids(BTreeSet<String>),
    /// An opaque parsed expression.
    Expr(Arc<dyn PredicateHandle>),
    Not(Box<Filter>),
    And(Vec<Filter>),
    Or(Vec<Filter>),
}

impl Filter {
    /// An identity filter over a set of feature ids.
    pub fn fids<I, S>(ids: I) -> Filter
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Filter::Fids(ids.into_iter().map(Into::into).collect())
    }

    /// Parse expression text through the supplied collaborator.
    pub fn parse(text: &str, parser: &dyn ExpressionParser) -> Result<Filter, Error> {
        if text.trim().eq_ignore_ascii_case("INCLUDE") {
            return Ok(Filter::Pass);
        }
        Ok(Filter::Expr(parser.parse(text)?))
    }

    pub fn not(self) -> Filter {
        Filter::Not(Box::new(self))
    }

    pub fn and(self, other: Filter) -> Filter {
        Filter::And(vec![self, other])
    }

    pub fn or(self, other: Filter) -> Filter {
        Filter::Or(vec![self, other])
    }

    pub fn evaluate(&self, record: &RawFeature) -> bool {
        match self {
            Filter::Pass => true,
            Filter::Fids(ids) => ids.contains(&record.id),
            Filter::Expr(predicate) => predicate.evaluate(record),
            Filter::Not(inner) => !inner.evaluate(record),
            Filter::And(parts) => parts.iter().all(|f| f.evaluate(record)),
            Filter::Or(parts) => parts.iter().any(|f| f.evaluate(record)),
        }
    }

    pub fn to_text(&self) -> String {
        match self {
            Filter::Pass => "INCLUDE".to_string(),
            Filter::Fids(ids) => {
                let list = ids.iter().cloned().collect::<Vec<_>>().join(", ");
                format!("IN ({})", list)
            }
            Filter::Expr(predicate) => predicate.to_text(),
            Filter::Not(inner) => format!("NOT ({})", inner.to_text()),
            Filter::And(parts) => parts
                .iter()
                .map(|f| format!("({})", f.to_text()))
                .collect::<Vec<_>>()
                .join(" AND "),
            Filter::Or(parts) => parts
                .iter()
                .map(|f| format!("({})", f.to_text()))
                .collect::<Vec<_>>()
                .join(" OR "),
        }
    }
}

impl Default for Filter {
    fn default() -> Self {
        Filter::Pass
    }
}

impl std::fmt::Debug for Filter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Filter({})", self.to_text())
    }
}

impl RecordPredicate for Filter {
    fn matches(&self, record: &RawFeature) -> bool {
        self.evaluate(record)
    }

    fn describe(&self) -> String {
        self.to_text()
    }
}

type FilterRegistry = TypeRegistry<Json, (), Filter>;

lazy_static! {
    static ref REGISTRY: RwLock<FilterRegistry> = RwLock::new(seeded_registry());
}

/// Construct a filter from a configuration object.
pub fn create(config: &Json) -> Result<Filter, Error> {
    let registry = REGISTRY.read().expect("filter registry poisoned");
    registry.create(config)
}

/// Append a filter registration.
pub fn register(entry: Entry<Json, (), Filter>) {
    let mut registry = REGISTRY.write().expect("filter registry poisoned");
    registry.register(entry);
}

fn seeded_registry() -> FilterRegistry {
    let mut registry = FilterRegistry::new();

    registry.register(Entry::new(
        "Fids",
        |config: &Json| config.get("fids").map(Json::is_array).unwrap_or(false),
        |config| {
            let ids = config
                .get("fids")
                .and_then(Json::as_array)
                .ok_or_else(|| Error::invalid("fids must be an array"))?
                .iter()
                .map(|v| {
                    v.as_str()
                        .map(str::to_string)
                        .ok_or_else(|| Error::invalid("fids entries must be strings"))
                })
                .collect::<Result<BTreeSet<_>, _>>()?;
            Ok(Filter::Fids(ids))
        },
    ));

    registry.register(Entry::new(
        "Pass",
        |config: &Json| {
            config.is_null() || config.as_object().map(|o| o.is_empty()).unwrap_or(false)
        },
        |_| Ok(Filter::Pass),
    ));

    registry
}
