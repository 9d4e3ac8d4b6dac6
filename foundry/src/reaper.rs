//! Age-based cleanup of locally cached images.
//!
//! Only images carrying the repository label are considered. Anything created
//! at or before `now - min_age` is force-deleted from the local daemon. Images
//! whose creation time is unknown are kept.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio_util::sync::CancellationToken;

use crate::creator::ImageCreator;
use crate::error::Result;

/// What one reaper pass did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ReapSummary {
    /// Images deleted
    pub removed: usize,
    /// Managed images younger than the cutoff
    pub retained: usize,
    /// Images without the management labels, left alone
    pub unmanaged: usize,
    /// Deletions that failed
    pub failed: usize,
}

/// Run one pass with the current time.
pub async fn reap<C>(min_age: Duration, creator: &C) -> Result<ReapSummary>
where
    C: ImageCreator + ?Sized,
{
    reap_at(Utc::now(), min_age, creator).await
}

fn cutoff(now: DateTime<Utc>, min_age: Duration) -> DateTime<Utc> {
    chrono::Duration::from_std(min_age)
        .ok()
        .and_then(|age| now.checked_sub_signed(age))
        .unwrap_or(DateTime::<Utc>::MIN_UTC)
}

/// Run one pass as if the current time were `now`.
///
/// A failed deletion is logged and counted, and the pass continues. Failing to
/// list images fails the pass.
#[tracing::instrument(skip(creator))]
pub async fn reap_at<C>(now: DateTime<Utc>, min_age: Duration, creator: &C) -> Result<ReapSummary>
where
    C: ImageCreator + ?Sized,
{
    let cutoff = cutoff(now, min_age);
    let images = creator.local_images().await?;

    let mut summary = ReapSummary::default();
    for image in images {
        if !image.is_managed() {
            summary.unmanaged += 1;
            continue;
        }

        match image.created {
            Some(created) if created <= cutoff => {}
            Some(_) => {
                summary.retained += 1;
                continue;
            }
            None => {
                tracing::warn!(id = %image.id, "keeping image with unknown creation time");
                summary.retained += 1;
                continue;
            }
        }

        match creator.delete_image_revision_local(&image.id).await {
            Ok(()) => {
                tracing::info!(id = %image.id, created = ?image.created, "reaped image");
                summary.removed += 1;
            }
            Err(error) => {
                tracing::warn!(id = %image.id, error = %error, "failed to reap image");
                summary.failed += 1;
            }
        }
    }

    tracing::debug!(?summary, %cutoff, "reaper pass finished");
    Ok(summary)
}

/// Run a pass every `interval` until `shutdown` is cancelled.
///
/// The first pass starts after one interval. Pass errors are logged, never returned.
pub async fn reap_forever<C>(
    min_age: Duration,
    creator: &C,
    interval: Duration,
    shutdown: CancellationToken,
) where
    C: ImageCreator + ?Sized,
{
    loop {
        tokio::select! {
            _ = shutdown.cancelled() => {
                tracing::debug!("reaper stopped");
                return;
            }
            _ = tokio::time::sleep(interval) => {}
        }

        if let Err(error) = reap(min_age, creator).await {
            tracing::error!(error = %error, "reaper pass failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use chrono::TimeZone as _;

    use super::*;
    use crate::fake::FakeCreator;
    use crate::image::ManagedImage;
    use crate::labels::REPO_LABEL;

    fn image(id: &str, created: Option<DateTime<Utc>>, managed: bool) -> ManagedImage {
        let mut labels = BTreeMap::new();
        if managed {
            labels.insert(REPO_LABEL.to_owned(), "acme".to_owned());
        }
        ManagedImage {
            id: id.to_owned(),
            created,
            repo_tags: Vec::new(),
            labels,
            size: None,
        }
    }

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap()
    }

    const HOUR: Duration = Duration::from_secs(3600);

    #[tokio::test]
    async fn deletes_only_old_managed_images() {
        let creator = FakeCreator::with_local(vec![
            image("old", Some(now() - chrono::Duration::hours(3)), true),
            image("edge", Some(now() - chrono::Duration::hours(1)), true),
            image("new", Some(now() - chrono::Duration::minutes(10)), true),
            image("base", Some(now() - chrono::Duration::days(30)), false),
        ]);

        let summary = reap_at(now(), HOUR, &creator).await.unwrap();
        assert_eq!(
            summary,
            ReapSummary {
                removed: 2,
                retained: 1,
                unmanaged: 1,
                failed: 0
            }
        );
        assert_eq!(creator.deleted(), vec!["old".to_owned(), "edge".to_owned()]);
    }

    #[tokio::test]
    async fn failed_delete_does_not_stop_the_pass() {
        let creator = FakeCreator::with_local(vec![
            image("stuck", Some(now() - chrono::Duration::hours(5)), true),
            image("old", Some(now() - chrono::Duration::hours(5)), true),
        ])
        .failing_delete("stuck");

        let summary = reap_at(now(), HOUR, &creator).await.unwrap();
        assert_eq!(summary.removed, 1);
        assert_eq!(summary.failed, 1);
        assert_eq!(creator.deleted(), vec!["old".to_owned()]);
    }

    #[tokio::test]
    async fn unknown_creation_time_is_retained() {
        let creator = FakeCreator::with_local(vec![
            image("undated", None, true),
            image("old", Some(now() - chrono::Duration::days(2)), true),
        ]);

        let summary = reap_at(now(), HOUR, &creator).await.unwrap();
        assert_eq!(summary.removed, 1);
        assert_eq!(summary.retained, 1);
        assert_eq!(creator.deleted(), vec!["old".to_owned()]);
    }

    #[test]
    fn huge_min_age_keeps_everything() {
        assert_eq!(cutoff(now(), Duration::MAX), DateTime::<Utc>::MIN_UTC);
    }

    #[tokio::test(start_paused = true)]
    async fn runs_until_shutdown() {
        let creator = std::sync::Arc::new(FakeCreator::with_local(Vec::new()));
        let shutdown = CancellationToken::new();

        let task = tokio::spawn({
            let creator = creator.clone();
            let shutdown = shutdown.clone();
            async move { reap_forever(HOUR, &creator, Duration::from_secs(60), shutdown).await }
        });

        tokio::time::sleep(Duration::from_secs(150)).await;
        shutdown.cancel();
        task.await.unwrap();

        assert_eq!(creator.local_listings(), 2);
    }
}
