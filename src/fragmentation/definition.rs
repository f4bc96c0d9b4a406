//! View definitions
//!
//! A view definition is a JSON document:
//!
//! ```json
//! {
//!   "pageSize": 250,
//!   "fragmentation": [
//!     { "type": "time",
//!       "path": "http://purl.org/dc/terms/created",
//!       "buckets": ["P1Y", "P1M", "P1D"] }
//!   ]
//! }
//! ```
//!
//! Every field is optional. Without a fragmentation strategy all members go to
//! the view's default bucket.

use crate::fragmentation::error::{FragmentationError, FragmentationResult};
use crate::fragmentation::period::Period;
use crate::fragmentation::time::TimeFragmentation;
use crate::storage::View;
use serde::Deserialize;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawDefinition {
    #[serde(default)]
    page_size: Option<u32>,
    #[serde(default)]
    fragmentation: Vec<RawStrategy>,
}

#[derive(Debug, Deserialize)]
struct RawStrategy {
    #[serde(rename = "type")]
    kind: String,
    #[serde(flatten)]
    settings: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct TimeSettings {
    path: PathSetting,
    #[serde(default)]
    buckets: Vec<String>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum PathSetting {
    Single(String),
    Sequence(Vec<String>),
}

/// How a view groups its members into buckets
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FragmentationStrategy {
    /// Every member goes to the default bucket
    Default,
    /// Members go to a hierarchy of time buckets
    Time(TimeFragmentation),
}

impl FragmentationStrategy {
    pub fn name(&self) -> &'static str {
        match self {
            FragmentationStrategy::Default => "default",
            FragmentationStrategy::Time(_) => "time",
        }
    }
}

/// Parsed view definition
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ViewDefinition {
    /// Overrides the paginator's default page size
    pub page_size: Option<u32>,
    pub strategy: FragmentationStrategy,
}

impl Default for ViewDefinition {
    fn default() -> Self {
        Self {
            page_size: None,
            strategy: FragmentationStrategy::Default,
        }
    }
}

impl ViewDefinition {
    /// Parse and validate a definition document
    pub fn parse(json: &str) -> FragmentationResult<Self> {
        let raw: RawDefinition = serde_json::from_str(json)?;

        if raw.page_size == Some(0) {
            return Err(FragmentationError::InvalidDefinition(
                "pageSize must be positive".to_string(),
            ));
        }

        let strategy = match raw.fragmentation.len() {
            0 => FragmentationStrategy::Default,
            1 => raw
                .fragmentation
                .into_iter()
                .next()
                .map(parse_strategy)
                .transpose()?
                .unwrap_or(FragmentationStrategy::Default),
            n => return Err(FragmentationError::MultipleStrategies(n)),
        };

        Ok(Self {
            page_size: raw.page_size,
            strategy,
        })
    }

    /// The definition stored with a view; none means the defaults
    pub fn for_view(view: &View) -> FragmentationResult<Self> {
        match view.definition.as_deref() {
            Some(json) if !json.trim().is_empty() => Self::parse(json),
            _ => Ok(Self::default()),
        }
    }
}

fn parse_strategy(raw: RawStrategy) -> FragmentationResult<FragmentationStrategy> {
    match raw.kind.as_str() {
        "time" => {
            let settings: TimeSettings = serde_json::from_value(raw.settings)?;
            let path = match settings.path {
                PathSetting::Single(predicate) => vec![predicate],
                PathSetting::Sequence(predicates) => predicates,
            };
            if path.is_empty() || path.iter().any(|p| p.trim().is_empty()) {
                return Err(FragmentationError::InvalidDefinition(
                    "time fragmentation needs a non-empty path".to_string(),
                ));
            }

            let periods = settings
                .buckets
                .iter()
                .map(|b| b.parse::<Period>())
                .collect::<FragmentationResult<Vec<_>>>()?;

            Ok(FragmentationStrategy::Time(TimeFragmentation::new(
                path, periods,
            )))
        }
        other => Err(FragmentationError::UnknownStrategy(other.to_string())),
    }
}
