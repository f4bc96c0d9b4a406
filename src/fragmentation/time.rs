//! Time fragmentation: from a member to its chain of time buckets

use crate::fragmentation::error::ResolutionError;
use crate::fragmentation::period::{Period, TimeBucket};
use crate::rdf::{objects_along_path, Term, XSD_DATE_TIME};
use crate::storage::Member;
use chrono::{DateTime, NaiveDateTime, Utc};

/// Relation type for the lower boundary of a time bucket
pub const GREATER_THAN_OR_EQUAL_TO: &str = "https://w3id.org/tree#GreaterThanOrEqualToRelation";

/// Relation type for the upper boundary of a time bucket
pub const LESS_THAN: &str = "https://w3id.org/tree#LessThanRelation";

/// The buckets one timestamp falls into, coarsest first
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimeBucketPath(Vec<TimeBucket>);

impl TimeBucketPath {
    pub fn buckets(&self) -> &[TimeBucket] {
        &self.0
    }

    /// The finest bucket, the only one that holds the member
    pub fn leaf(&self) -> Option<&TimeBucket> {
        self.0.last()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Time-based fragmentation of one view
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimeFragmentation {
    path: Vec<String>,
    periods: Vec<Period>,
}

impl TimeFragmentation {
    /// `path` must hold at least one predicate; no periods means the defaults
    pub fn new(path: Vec<String>, periods: Vec<Period>) -> Self {
        let periods = if periods.is_empty() {
            Period::defaults()
        } else {
            periods
        };
        Self { path, periods }
    }

    /// Predicates leading from the entity to its timestamp
    pub fn path(&self) -> &[String] {
        &self.path
    }

    pub fn periods(&self) -> &[Period] {
        &self.periods
    }

    /// The path as written in relations: the predicate itself, or a list of
    /// predicates for a sequence path
    pub fn relation_path(&self) -> String {
        match self.path.as_slice() {
            [single] => single.clone(),
            sequence => {
                let items: Vec<String> = sequence.iter().map(|p| format!("<{}>", p)).collect();
                format!("({})", items.join(" "))
            }
        }
    }

    /// One bucket path per distinct timestamp of the member
    ///
    /// Only `xsd:dateTime` literals at the end of the path count. A member
    /// without any yields an empty list; a malformed one is an error.
    pub fn time_bucket_paths_for(
        &self,
        member: &Member,
    ) -> Result<Vec<TimeBucketPath>, ResolutionError> {
        let entity = Term::iri(member.entity_id.as_str());

        let mut timestamps: Vec<DateTime<Utc>> = Vec::new();
        for object in objects_along_path(&member.statements, &entity, &self.path) {
            if let Term::Literal {
                value, datatype, ..
            } = object
            {
                if datatype != XSD_DATE_TIME {
                    continue;
                }
                let ts = parse_date_time(value)?;
                if !timestamps.contains(&ts) {
                    timestamps.push(ts);
                }
            }
        }

        timestamps
            .into_iter()
            .map(|ts| {
                let mut buckets = self
                    .periods
                    .iter()
                    .map(|period| period.calculate_bucket(ts))
                    .collect::<Result<Vec<_>, _>>()?;
                buckets.sort_by_key(|b| b.from);
                Ok(TimeBucketPath(buckets))
            })
            .collect()
    }
}

/// Parse an `xsd:dateTime` lexical value; values without an offset are UTC
fn parse_date_time(value: &str) -> Result<DateTime<Utc>, ResolutionError> {
    let value = value.trim();
    if let Ok(ts) = DateTime::parse_from_rfc3339(value) {
        return Ok(ts.with_timezone(&Utc));
    }

    NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S%.f")
        .map(|naive| naive.and_utc())
        .map_err(|_| ResolutionError::InvalidTimestamp(value.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rdf::Statement;

    const CREATED: &str = "http://purl.org/dc/terms/created";
    const EVENT: &str = "http://example.org/event";
    const ENTITY: &str = "http://example.org/entity/1";

    fn member(statements: Vec<Statement>) -> Member {
        Member {
            mid: 1,
            member_id: format!("{}#v1", ENTITY),
            entity_id: ENTITY.to_string(),
            created_at: Utc::now(),
            statements,
        }
    }

    fn created(value: Term) -> Statement {
        Statement::new(Term::iri(ENTITY), CREATED, value)
    }

    #[test]
    fn test_default_periods_coarsest_first() {
        let fragmentation = TimeFragmentation::new(vec![CREATED.to_string()], Vec::new());
        let paths = fragmentation
            .time_bucket_paths_for(&member(vec![created(Term::date_time("2025-08-09T18:05:09Z"))]))
            .unwrap();

        assert_eq!(paths.len(), 1);
        let keys: Vec<&str> = paths[0].buckets().iter().map(|b| b.key.as_str()).collect();
        assert_eq!(
            keys,
            vec![
                "[2025 .. 2026]",
                "[2025-08 .. 2025-09]",
                "[2025-08-09 .. 2025-08-10]",
                "[2025-08-09T18:00:00Z .. 2025-08-09T19:00:00Z]",
            ]
        );
    }

    #[test]
    fn test_configured_periods_are_sorted() {
        let fragmentation = TimeFragmentation::new(
            vec![CREATED.to_string()],
            vec![Period::Days(1), Period::Years(1)],
        );
        let paths = fragmentation
            .time_bucket_paths_for(&member(vec![created(Term::date_time("2025-08-20T07:00:00Z"))]))
            .unwrap();

        assert_eq!(paths[0].buckets()[0].key, "[2025 .. 2026]");
        assert_eq!(paths[0].leaf().unwrap().key, "[2025-08-20 .. 2025-08-21]");
    }

    #[test]
    fn test_distinct_timestamps_produce_distinct_paths() {
        let fragmentation = TimeFragmentation::new(vec![CREATED.to_string()], vec![Period::Days(1)]);
        let paths = fragmentation
            .time_bucket_paths_for(&member(vec![
                created(Term::date_time("2025-08-20T07:00:00Z")),
                created(Term::date_time("2025-08-21T09:00:00Z")),
                // same instant written with an offset
                created(Term::date_time("2025-08-20T09:00:00+02:00")),
            ]))
            .unwrap();
        assert_eq!(paths.len(), 2);
    }

    #[test]
    fn test_unresolvable_member_has_no_paths() {
        let fragmentation = TimeFragmentation::new(vec![CREATED.to_string()], Vec::new());

        let none = fragmentation.time_bucket_paths_for(&member(Vec::new())).unwrap();
        assert!(none.is_empty());

        // plain strings are not timestamps
        let untyped = fragmentation
            .time_bucket_paths_for(&member(vec![created(Term::literal(
                "2025-08-20T07:00:00Z",
                crate::rdf::XSD_STRING,
            ))]))
            .unwrap();
        assert!(untyped.is_empty());
    }

    #[test]
    fn test_malformed_timestamp_is_an_error() {
        let fragmentation = TimeFragmentation::new(vec![CREATED.to_string()], Vec::new());
        let result =
            fragmentation.time_bucket_paths_for(&member(vec![created(Term::date_time("yesterday"))]));
        assert_eq!(
            result,
            Err(ResolutionError::InvalidTimestamp("yesterday".to_string()))
        );
    }

    #[test]
    fn test_sequence_path() {
        let fragmentation = TimeFragmentation::new(
            vec![EVENT.to_string(), CREATED.to_string()],
            vec![Period::Hours(1)],
        );
        let paths = fragmentation
            .time_bucket_paths_for(&member(vec![
                Statement::new(Term::iri(ENTITY), EVENT, Term::blank("b0")),
                Statement::new(Term::blank("b0"), CREATED, Term::date_time("2025-08-20T07:30:00")),
            ]))
            .unwrap();

        assert_eq!(
            paths[0].leaf().unwrap().key,
            "[2025-08-20T07:00:00Z .. 2025-08-20T08:00:00Z]"
        );
        assert_eq!(
            fragmentation.relation_path(),
            format!("(<{}> <{}>)", EVENT, CREATED)
        );
    }
}
