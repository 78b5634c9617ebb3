//! The event window resolver.
//!
//! Without an aggregation window and without `min_points` observations pass
//! through unchanged (apart from field projection and `NaN` removal). An
//! explicit aggregation window buckets the observations and keeps the last
//! value of every non-empty bucket. A `min_points` request without an
//! explicit window picks a granularity from [`AggregationWindow::LADDER`].
//!
//! Bucketing covers the half-open window `[start, end)`: an observation at
//! exactly `end` falls in no bucket.

use std::collections::{BTreeMap, BTreeSet};

use dd_node_timeseries_models::{
    AggregationWindow, Event, EventField, Observation, ObservationValue, TimeWindow, ValueType,
};

use crate::ResolveError;
use crate::bucket::{bucket_count, bucket_start};

/// Windowing parameters of one resolution call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EventQuery {
    /// The requested time range. Observations are expected to already be
    /// filtered to it, bounds included; aggregation drops those at `end`.
    pub window: TimeWindow,
    /// Explicit aggregation window. Takes precedence over `min_points`.
    pub aggregation: Option<AggregationWindow>,
    /// Minimum number of events wanted when no aggregation is given.
    pub min_points: Option<u64>,
    /// Fields to keep on every event; all fields when `None`.
    pub fields: Option<BTreeSet<EventField>>,
}

/// Resolves the events to return for `observations`.
///
/// # Errors
///
/// * [`ResolveError::InvalidParameter`] for an inverted window, a zero
///   `min_points`, or an overflow while bucketing.
/// * [`ResolveError::UnsupportedAggregation`] when a bucketing granularity
///   is requested for a series that is not numeric.
pub fn resolve(
    observations: &[Observation],
    query: &EventQuery,
    value_type: ValueType,
) -> Result<Vec<Event>, ResolveError> {
    let granularity = choose_granularity(observations, query, value_type)?;

    let events = if granularity.is_raw() {
        pass_through(observations)
    } else {
        aggregate_last_value(observations, query.window, granularity)?
    };

    log::trace!(
        "Resolved {} observations into {} events at {granularity}",
        observations.len(),
        events.len()
    );

    Ok(match &query.fields {
        Some(fields) => events.into_iter().map(|e| e.project(fields)).collect(),
        None => events,
    })
}

/// Picks the granularity a resolution call will use.
///
/// # Errors
///
/// See [`resolve`].
pub fn choose_granularity(
    observations: &[Observation],
    query: &EventQuery,
    value_type: ValueType,
) -> Result<AggregationWindow, ResolveError> {
    if query.window.is_inverted() {
        return Err(ResolveError::invalid("start must not be after end"));
    }
    if query.min_points == Some(0) {
        return Err(ResolveError::invalid("min_points must be at least 1"));
    }

    if let Some(aggregation) = query.aggregation {
        if !aggregation.is_raw() && !value_type.is_numeric() {
            return Err(ResolveError::UnsupportedAggregation {
                aggregation,
                value_type,
            });
        }
        return Ok(aggregation);
    }

    let Some(min_points) = query.min_points else {
        return Ok(AggregationWindow::Raw);
    };

    let raw_count = u64::try_from(observations.len()).unwrap_or(u64::MAX);
    if raw_count <= min_points || !value_type.is_numeric() {
        return Ok(AggregationWindow::Raw);
    }

    let Some((start, end)) = effective_bounds(query.window, observations) else {
        return Ok(AggregationWindow::Raw);
    };

    for granularity in AggregationWindow::LADDER {
        if bucket_count(granularity, start, end)? >= min_points {
            return Ok(granularity);
        }
    }

    Ok(AggregationWindow::Raw)
}

/// Fills a missing window bound from the first or last observation.
fn effective_bounds(window: TimeWindow, observations: &[Observation]) -> Option<(i64, i64)> {
    let start = window
        .start
        .or_else(|| observations.iter().map(|o| o.timestamp).min())?;
    let end = window.end.or_else(|| {
        observations
            .iter()
            .map(|o| o.timestamp)
            .max()
            .map(|ts| ts.saturating_add(1))
    })?;
    Some((start, end))
}

fn pass_through(observations: &[Observation]) -> Vec<Event> {
    observations
        .iter()
        .filter(|o| !o.value.is_nan())
        .map(Event::from)
        .collect()
}

/// Buckets the observations inside `[window.start, window.end)` and keeps,
/// per bucket, the value with the highest timestamp. Buckets holding only
/// `NaN` values are dropped.
fn aggregate_last_value(
    observations: &[Observation],
    window: TimeWindow,
    granularity: AggregationWindow,
) -> Result<Vec<Event>, ResolveError> {
    let mut buckets: BTreeMap<i64, (i64, &ObservationValue)> = BTreeMap::new();

    for observation in observations
        .iter()
        .filter(|o| window.contains(o.timestamp) && !o.value.is_nan())
    {
        let start = bucket_start(granularity, observation.timestamp)?;
        let entry = buckets
            .entry(start)
            .or_insert((observation.timestamp, &observation.value));
        if observation.timestamp >= entry.0 {
            *entry = (observation.timestamp, &observation.value);
        }
    }

    Ok(buckets
        .into_iter()
        .map(|(start, (_, value))| Event::new(start, value.clone()))
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    const HOUR: i64 = 3_600_000;

    fn query(
        window: TimeWindow,
        aggregation: Option<AggregationWindow>,
        min_points: Option<u64>,
    ) -> EventQuery {
        EventQuery {
            window,
            aggregation,
            min_points,
            fields: None,
        }
    }

    fn pairs(events: &[Event]) -> Vec<(i64, f64)> {
        events
            .iter()
            .map(|e| {
                (
                    e.timestamp.unwrap(),
                    e.value.as_ref().and_then(ObservationValue::as_f64).unwrap(),
                )
            })
            .collect()
    }

    #[test]
    fn raw_pass_through_preserves_order_and_length() {
        let observations = vec![
            Observation::number(1000, 5.0),
            Observation::number(1500, 6.0),
            Observation::number(61_000, 7.0),
        ];
        let events = resolve(
            &observations,
            &EventQuery::default(),
            ValueType::Float,
        )
        .unwrap();
        assert_eq!(
            pairs(&events),
            vec![(1000, 5.0), (1500, 6.0), (61_000, 7.0)]
        );
    }

    #[test]
    fn raw_pass_through_keeps_text_values() {
        let observations = vec![Observation::text(0, "open"), Observation::text(10, "closed")];
        let events = resolve(&observations, &EventQuery::default(), ValueType::Text).unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(
            events[1].value,
            Some(ObservationValue::Text("closed".to_string()))
        );
    }

    #[test]
    fn minute_aggregation_keeps_last_value_per_bucket() {
        let observations = vec![
            Observation::number(1000, 5.0),
            Observation::number(1500, 6.0),
            Observation::number(61_000, 7.0),
        ];
        let q = query(
            TimeWindow::between(0, 120_000),
            Some(AggregationWindow::Minute),
            None,
        );
        let events = resolve(&observations, &q, ValueType::Float).unwrap();
        assert_eq!(pairs(&events), vec![(0, 6.0), (60_000, 7.0)]);
    }

    #[test]
    fn single_observation_hour_aggregation() {
        let observations = vec![Observation::number(0, 1.0)];
        let q = query(TimeWindow::default(), Some(AggregationWindow::Hour), None);
        let events = resolve(&observations, &q, ValueType::Float).unwrap();
        assert_eq!(pairs(&events), vec![(0, 1.0)]);
    }

    #[test]
    fn aggregation_on_text_series_is_unsupported() {
        let observations = vec![Observation::number(0, 1.0)];
        let q = query(TimeWindow::default(), Some(AggregationWindow::Hour), None);
        assert_eq!(
            resolve(&observations, &q, ValueType::Text),
            Err(ResolveError::UnsupportedAggregation {
                aggregation: AggregationWindow::Hour,
                value_type: ValueType::Text,
            })
        );
        assert!(resolve(&observations, &q, ValueType::File).is_err());
    }

    #[test]
    fn explicit_raw_is_allowed_on_text_series() {
        let observations = vec![Observation::text(0, "a")];
        let q = query(TimeWindow::default(), Some(AggregationWindow::Raw), None);
        assert_eq!(resolve(&observations, &q, ValueType::Text).unwrap().len(), 1);
    }

    #[test]
    fn explicit_aggregation_ignores_min_points() {
        let observations: Vec<_> = (0..10).map(|i| Observation::number(i * 1000, 1.0)).collect();
        let q = query(
            TimeWindow::between(0, HOUR),
            Some(AggregationWindow::Hour),
            Some(5),
        );
        assert_eq!(resolve(&observations, &q, ValueType::Float).unwrap().len(), 1);
    }

    #[test]
    fn boundary_observation_starts_a_new_bucket() {
        let observations = vec![
            Observation::number(59_999, 1.0),
            Observation::number(60_000, 2.0),
        ];
        let q = query(TimeWindow::default(), Some(AggregationWindow::Minute), None);
        let events = resolve(&observations, &q, ValueType::Float).unwrap();
        assert_eq!(pairs(&events), vec![(0, 1.0), (60_000, 2.0)]);
    }

    #[test]
    fn empty_buckets_are_omitted() {
        let observations = vec![
            Observation::number(0, 1.0),
            Observation::number(5 * HOUR + 10, 2.0),
        ];
        let q = query(
            TimeWindow::between(0, 6 * HOUR),
            Some(AggregationWindow::Hour),
            None,
        );
        let events = resolve(&observations, &q, ValueType::Float).unwrap();
        assert_eq!(pairs(&events), vec![(0, 1.0), (5 * HOUR, 2.0)]);
    }

    #[test]
    fn nan_values_are_excluded_everywhere() {
        let observations = vec![
            Observation::number(0, 1.0),
            Observation::number(10, f64::NAN),
            Observation::number(HOUR, f64::NAN),
        ];
        let raw = resolve(&observations, &EventQuery::default(), ValueType::Float).unwrap();
        assert_eq!(pairs(&raw), vec![(0, 1.0)]);

        let q = query(TimeWindow::default(), Some(AggregationWindow::Hour), None);
        let aggregated = resolve(&observations, &q, ValueType::Float).unwrap();
        assert_eq!(pairs(&aggregated), vec![(0, 1.0)]);
    }

    #[test]
    fn events_align_to_bucket_boundaries_for_every_granularity() {
        let observations: Vec<_> = (0..500)
            .map(|i| Observation::number(1_700_000_000_000 + i * 7_919_777, 1.0))
            .collect();
        for granularity in AggregationWindow::LADDER {
            let q = query(TimeWindow::default(), Some(granularity), None);
            for event in resolve(&observations, &q, ValueType::Float).unwrap() {
                let ts = event.timestamp.unwrap();
                assert_eq!(bucket_start(granularity, ts).unwrap(), ts, "{granularity}");
            }
        }
    }

    #[test]
    fn last_value_is_max_timestamp_even_when_unordered() {
        let observations = vec![
            Observation::number(30_000, 3.0),
            Observation::number(10_000, 1.0),
        ];
        let q = query(TimeWindow::default(), Some(AggregationWindow::Minute), None);
        let events = resolve(&observations, &q, ValueType::Float).unwrap();
        assert_eq!(pairs(&events), vec![(0, 3.0)]);
    }

    #[test]
    fn event_count_is_non_increasing_along_the_ladder() {
        let observations: Vec<_> = (0..2_000)
            .map(|i| Observation::number(i * 97_003, 0.5))
            .collect();
        let mut previous = observations.len();
        for granularity in AggregationWindow::LADDER {
            let q = query(TimeWindow::default(), Some(granularity), None);
            let count = resolve(&observations, &q, ValueType::Float).unwrap().len();
            assert!(count <= previous, "{granularity}: {count} > {previous}");
            previous = count;
        }
    }

    #[test]
    fn min_points_not_exceeded_by_raw_count_passes_through() {
        let observations = vec![Observation::number(0, 1.0), Observation::number(1, 2.0)];
        let q = query(TimeWindow::between(0, HOUR), None, Some(2));
        assert_eq!(
            choose_granularity(&observations, &q, ValueType::Float).unwrap(),
            AggregationWindow::Raw
        );
        assert_eq!(resolve(&observations, &q, ValueType::Float).unwrap().len(), 2);
    }

    #[test]
    fn min_points_selects_finest_granularity_meeting_the_bound() {
        let observations = vec![
            Observation::number(0, 1.0),
            Observation::number(1_200_000, 2.0),
            Observation::number(2_400_000, 3.0),
        ];
        let q = query(TimeWindow::between(0, HOUR), None, Some(2));
        assert_eq!(
            choose_granularity(&observations, &q, ValueType::Float).unwrap(),
            AggregationWindow::Second
        );
        let events = resolve(&observations, &q, ValueType::Float).unwrap();
        assert!((2..=3).contains(&events.len()));
    }

    #[test]
    fn min_points_skips_granularities_with_too_few_buckets() {
        let observations: Vec<_> = (0..10).map(|i| Observation::number(i, 1.0)).collect();
        // 3 seconds: `second` yields 3 buckets, too few for 5.
        let q = query(TimeWindow::between(0, 3_000), None, Some(5));
        assert_eq!(
            choose_granularity(&observations, &q, ValueType::Float).unwrap(),
            AggregationWindow::Raw
        );
    }

    #[test]
    fn min_points_picks_first_ladder_step_with_enough_buckets() {
        let observations: Vec<_> = (0..100).map(|i| Observation::number(i * 1000, 1.0)).collect();
        let q = query(TimeWindow::between(0, 100_000), None, Some(50));
        // second: 100 buckets >= 50.
        assert_eq!(
            choose_granularity(&observations, &q, ValueType::Float).unwrap(),
            AggregationWindow::Second
        );
        let q = query(TimeWindow::between(0, 100_000), None, Some(101));
        assert_eq!(
            choose_granularity(&observations, &q, ValueType::Float).unwrap(),
            AggregationWindow::Raw
        );
    }

    #[test]
    fn min_points_uses_observation_extent_for_missing_bounds() {
        let observations: Vec<_> = (0..10).map(|i| Observation::number(i * HOUR, 1.0)).collect();
        let q = query(TimeWindow::default(), None, Some(3));
        assert_eq!(
            choose_granularity(&observations, &q, ValueType::Float).unwrap(),
            AggregationWindow::Second
        );
    }

    #[test]
    fn min_points_on_text_series_passes_through() {
        let observations: Vec<_> = (0..10).map(|i| Observation::text(i, "x")).collect();
        let q = query(TimeWindow::between(0, HOUR), None, Some(2));
        assert_eq!(resolve(&observations, &q, ValueType::Text).unwrap().len(), 10);
    }

    #[test]
    fn invalid_parameters_are_rejected() {
        let observations = vec![Observation::number(0, 1.0)];
        let inverted = query(TimeWindow::between(10, 0), None, None);
        assert!(matches!(
            resolve(&observations, &inverted, ValueType::Float),
            Err(ResolveError::InvalidParameter(_))
        ));
        let zero = query(TimeWindow::between(0, 10), None, Some(0));
        assert!(matches!(
            resolve(&observations, &zero, ValueType::Float),
            Err(ResolveError::InvalidParameter(_))
        ));
    }

    #[test]
    fn projection_applies_to_aggregated_events() {
        let observations = vec![Observation::number(1000, 5.0)];
        let q = EventQuery {
            window: TimeWindow::default(),
            aggregation: Some(AggregationWindow::Minute),
            min_points: None,
            fields: Some([EventField::Timestamp].into_iter().collect()),
        };
        let events = resolve(&observations, &q, ValueType::Float).unwrap();
        assert_eq!(events[0].timestamp, Some(0));
        assert_eq!(events[0].value, None);
        assert_eq!(serde_json::to_string(&events).unwrap(), r#"[{"timestamp":0}]"#);
    }

    #[test]
    fn observation_at_window_end_falls_in_no_bucket() {
        let observations = vec![
            Observation::number(1000, 5.0),
            Observation::number(120_000, 9.0),
        ];
        let q = query(
            TimeWindow::between(0, 120_000),
            Some(AggregationWindow::Minute),
            None,
        );
        let events = resolve(&observations, &q, ValueType::Float).unwrap();
        assert_eq!(pairs(&events), vec![(0, 5.0)]);
        for event in &events {
            assert!(q.window.contains(event.timestamp.unwrap()));
        }
    }

    #[test]
    fn raw_output_keeps_observation_at_window_end() {
        let observations = vec![
            Observation::number(1000, 5.0),
            Observation::number(120_000, 9.0),
        ];
        let q = query(TimeWindow::between(0, 120_000), None, None);
        assert_eq!(resolve(&observations, &q, ValueType::Float).unwrap().len(), 2);
    }

    #[test]
    fn min_points_counts_calendar_buckets_across_a_year_boundary() {
        // 2019-12-31T23:59:59.998Z .. 2020-01-01T00:00:00.002Z
        let new_year = 1_577_836_800_000;
        let window = TimeWindow::between(new_year - 2, new_year + 2);
        let observations = vec![
            Observation::number(new_year - 2, 1.0),
            Observation::number(new_year - 1, 1.5),
            Observation::number(new_year, 2.0),
            Observation::number(new_year + 1, 3.0),
        ];

        // Every fixed width yields one bucket; month and year yield two.
        let q = query(window, None, Some(2));
        assert_eq!(
            choose_granularity(&observations, &q, ValueType::Float).unwrap(),
            AggregationWindow::Month
        );
        assert_eq!(
            pairs(&resolve(&observations, &q, ValueType::Float).unwrap()),
            vec![(1_575_158_400_000, 1.5), (new_year, 3.0)]
        );

        let q = query(window, None, Some(3));
        assert_eq!(
            choose_granularity(&observations, &q, ValueType::Float).unwrap(),
            AggregationWindow::Raw
        );

        let years = query(window, Some(AggregationWindow::Year), None);
        assert_eq!(
            pairs(&resolve(&observations, &years, ValueType::Float).unwrap()),
            vec![(1_546_300_800_000, 1.5), (new_year, 3.0)]
        );
    }

    #[test]
    fn input_is_not_mutated() {
        let observations = vec![Observation::number(1000, 5.0), Observation::number(2000, 6.0)];
        let before = observations.clone();
        let q = query(TimeWindow::default(), Some(AggregationWindow::Minute), None);
        let _ = resolve(&observations, &q, ValueType::Float).unwrap();
        assert_eq!(observations, before);
    }
}
