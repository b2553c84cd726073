//! Finding resources left behind by earlier runs.
//!
//! Only resources carrying the ownership label are listed (the filter is
//! evaluated by the service) and only those whose `createdat` label parses
//! and is older than the threshold are reported as stale. A resource without
//! a readable creation time is never considered stale.
use std::collections::HashMap;
use std::time::Duration;

use async_stream::try_stream;
use chrono::{DateTime, Utc};
use futures::stream::{BoxStream, StreamExt};
use tracing::{debug, info, instrument, warn};

use crate::admin::{AdminError, AdminService};
use crate::error::TestEnvError;
use crate::naming::{CREATED_AT_LABEL, ownership_filter, parse_created_at};
use crate::resource::ManagedResource;

/// Age after which an owned resource is presumed abandoned.
pub const DEFAULT_STALE_AFTER: Duration = Duration::from_secs(2 * 60 * 60);

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    Stale { age_secs: i64 },
    Fresh { age_secs: i64 },
    Unlabeled,
    Unparsable { value: String },
}

/// Classifies a resource by its `createdat` label relative to `now`.
///
/// Creation times in the future count as fresh.
pub fn classify(
    labels: &HashMap<String, String>,
    threshold: Duration,
    now: DateTime<Utc>,
) -> Verdict {
    let Some(value) = labels.get(CREATED_AT_LABEL) else {
        return Verdict::Unlabeled;
    };
    let Some(created) = parse_created_at(value) else {
        return Verdict::Unparsable {
            value: value.clone(),
        };
    };
    let age_secs = now.timestamp().saturating_sub(created);
    if age_secs > 0 && age_secs as u64 > threshold.as_secs() {
        Verdict::Stale { age_secs }
    } else {
        Verdict::Fresh { age_secs }
    }
}

#[derive(Debug, Default)]
pub struct ScanOutcome {
    pub stale: Vec<ManagedResource>,
    pub fresh: Vec<String>,
    pub skipped: Vec<String>,
    /// Set when listing stopped early; everything before the failure is
    /// still reported.
    pub error: Option<TestEnvError>,
}

/// Streams every instance in `project` matching `filter`, following page
/// tokens until the service stops returning one.
pub fn list_all_instances<'a>(
    service: &'a dyn AdminService,
    project: &'a str,
    filter: &'a str,
) -> BoxStream<'a, Result<ManagedResource, AdminError>> {
    try_stream! {
        let mut page_token: Option<String> = None;
        loop {
            let page = service
                .list_instances(project, filter, page_token.as_deref())
                .await?;
            for item in page.items {
                yield item;
            }
            match page.next_page_token {
                Some(token) if !token.is_empty() => page_token = Some(token),
                _ => break,
            }
        }
    }
    .boxed()
}

/// Scans `project` for owned instances and sorts them into stale, fresh and
/// skipped. `exclude` names a resource that is never reported (the run's own
/// instance, which is deleted separately).
#[instrument(skip(service, exclude))]
pub async fn scan_instances(
    service: &dyn AdminService,
    project: &str,
    owner_label: &str,
    threshold: Duration,
    now: DateTime<Utc>,
    exclude: Option<&str>,
) -> ScanOutcome {
    let filter = ownership_filter(owner_label);
    let mut outcome = ScanOutcome::default();
    let mut instances = list_all_instances(service, project, &filter);

    while let Some(next) = instances.next().await {
        let instance = match next {
            Ok(instance) => instance,
            Err(source) => {
                let err = TestEnvError::ScanFailed {
                    parent: format!("projects/{project}"),
                    source,
                };
                warn!("{err}");
                outcome.error = Some(err);
                break;
            }
        };
        if exclude == Some(instance.name.as_str()) {
            continue;
        }
        match classify(&instance.labels, threshold, now) {
            Verdict::Stale { age_secs } => {
                info!("Found stale test instance {} ({age_secs}s old)", instance.name);
                outcome.stale.push(instance);
            }
            Verdict::Fresh { age_secs } => {
                debug!("Test instance {} is {age_secs}s old", instance.name);
                outcome.fresh.push(instance.name);
            }
            Verdict::Unlabeled => {
                warn!(
                    "Instance {} has no {CREATED_AT_LABEL} label, skipping",
                    instance.name
                );
                outcome.skipped.push(instance.name);
            }
            Verdict::Unparsable { value } => {
                warn!(
                    "Failed to parse created time from string {value:?} of instance {}, skipping",
                    instance.name
                );
                outcome.skipped.push(instance.name);
            }
        }
    }
    outcome
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::naming::encode_created_at;
    use crate::testing::{Call, FakeAdmin};
    use chrono::TimeZone;

    fn labels(created: Option<&str>) -> HashMap<String, String> {
        let mut labels = HashMap::from([("gogormtestinstance".to_string(), "true".to_string())]);
        if let Some(created) = created {
            labels.insert(CREATED_AT_LABEL.to_string(), created.to_string());
        }
        labels
    }

    fn now() -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000, 0).unwrap()
    }

    #[test]
    fn test_classify_threshold_boundary() {
        let now = now();
        let at = |age: i64| labels(Some(&encode_created_at(now.timestamp() - age)));

        assert_eq!(
            classify(&at(7200), DEFAULT_STALE_AFTER, now),
            Verdict::Fresh { age_secs: 7200 }
        );
        assert_eq!(
            classify(&at(7201), DEFAULT_STALE_AFTER, now),
            Verdict::Stale { age_secs: 7201 }
        );
        assert_eq!(
            classify(&at(-30), DEFAULT_STALE_AFTER, now),
            Verdict::Fresh { age_secs: -30 }
        );
    }

    #[test]
    fn test_classify_missing_and_garbage_labels() {
        assert_eq!(
            classify(&labels(None), DEFAULT_STALE_AFTER, now()),
            Verdict::Unlabeled
        );
        assert_eq!(
            classify(&labels(Some("yesterday")), DEFAULT_STALE_AFTER, now()),
            Verdict::Unparsable {
                value: "yesterday".to_string()
            }
        );
    }

    #[tokio::test]
    async fn test_list_all_instances_follows_pages() {
        let fake = FakeAdmin::with_page_size(2);
        for i in 0..5 {
            fake.insert_instance(&format!("projects/p/instances/i{i}"), labels(None));
        }
        fake.insert_instance("projects/other/instances/x", labels(None));

        let all: Vec<_> = list_all_instances(&fake, "p", "labels.gogormtestinstance:*")
            .collect()
            .await;

        assert_eq!(all.len(), 5);
        assert!(all.iter().all(|r| r.is_ok()));
        assert_eq!(fake.count(Call::ListInstances), 3);
    }

    #[tokio::test]
    async fn test_scan_filters_on_owner_label() {
        let fake = FakeAdmin::new();
        let old = encode_created_at(now().timestamp() - 3 * 3600);
        fake.insert_instance("projects/p/instances/owned", labels(Some(&old)));
        fake.insert_instance(
            "projects/p/instances/foreign",
            HashMap::from([(CREATED_AT_LABEL.to_string(), old.clone())]),
        );

        let outcome =
            scan_instances(&fake, "p", "gogormtestinstance", DEFAULT_STALE_AFTER, now(), None).await;

        assert_eq!(outcome.stale.len(), 1);
        assert_eq!(outcome.stale[0].name, "projects/p/instances/owned");
    }

    #[tokio::test]
    async fn test_scan_excludes_own_instance() {
        let fake = FakeAdmin::new();
        let old = encode_created_at(now().timestamp() - 3 * 3600);
        fake.insert_instance("projects/p/instances/mine", labels(Some(&old)));

        let outcome = scan_instances(
            &fake,
            "p",
            "gogormtestinstance",
            DEFAULT_STALE_AFTER,
            now(),
            Some("projects/p/instances/mine"),
        )
        .await;

        assert!(outcome.stale.is_empty());
    }

    #[tokio::test]
    async fn test_scan_keeps_results_before_list_failure() {
        let fake = FakeAdmin::with_page_size(1);
        let old = encode_created_at(now().timestamp() - 3 * 3600);
        fake.insert_instance("projects/p/instances/a", labels(Some(&old)));
        fake.insert_instance("projects/p/instances/b", labels(Some(&old)));
        fake.fail_on(
            Call::ListInstances,
            2,
            AdminError::Transport("connection reset".to_string()),
        );

        let outcome =
            scan_instances(&fake, "p", "gogormtestinstance", DEFAULT_STALE_AFTER, now(), None).await;

        assert_eq!(outcome.stale.len(), 1);
        assert_eq!(outcome.stale[0].name, "projects/p/instances/a");
        assert!(matches!(
            outcome.error,
            Some(TestEnvError::ScanFailed { ref parent, .. }) if parent == "projects/p"
        ));
    }

    #[tokio::test]
    async fn test_scan_sorts_resources() {
        let fake = FakeAdmin::new();
        let now = now();
        fake.insert_instance(
            "projects/p/instances/old",
            labels(Some(&encode_created_at(now.timestamp() - 10_800))),
        );
        fake.insert_instance(
            "projects/p/instances/new",
            labels(Some(&encode_created_at(now.timestamp() - 60))),
        );
        fake.insert_instance("projects/p/instances/nolabel", labels(None));
        fake.insert_instance("projects/p/instances/garbage", labels(Some("tabc")));

        let outcome =
            scan_instances(&fake, "p", "gogormtestinstance", DEFAULT_STALE_AFTER, now, None).await;

        assert!(outcome.error.is_none());
        assert_eq!(outcome.stale.len(), 1);
        assert_eq!(outcome.fresh, vec!["projects/p/instances/new".to_string()]);
        assert_eq!(outcome.skipped.len(), 2);
    }
}
