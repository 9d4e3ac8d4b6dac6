use crate::creator::ImageCreator;
use crate::error::Result;

/// The next revision for `repo/application`: one more than the number of
/// images the backend currently holds.
///
/// Two callers racing on the same application can get the same answer.
#[tracing::instrument(skip(creator))]
pub async fn auto_revision<C>(repo: &str, application: &str, creator: &C) -> Result<String>
where
    C: ImageCreator + ?Sized,
{
    let count = creator.images(repo, application).await?.len();
    let revision = (count + 1).to_string();
    tracing::debug!(%revision, "allocated revision");
    Ok(revision)
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::*;
    use crate::fake::FakeCreator;
    use crate::identity::ImageIdentity;
    use crate::image::ManagedImage;

    fn image(identity: &ImageIdentity) -> ManagedImage {
        ManagedImage {
            id: format!("sha256:{}", identity.revision),
            created: Some(Utc::now()),
            repo_tags: vec![identity.tag_name()],
            labels: identity.labels(),
            size: None,
        }
    }

    #[tokio::test]
    async fn counts_up_from_one() {
        let creator = FakeCreator::with_images(Vec::new());

        for expected in ["1", "2", "3"] {
            let revision = auto_revision("acme", "web", &creator).await.unwrap();
            assert_eq!(revision, expected);
            creator.add_image(image(&ImageIdentity::new("acme", "web", revision)));
        }
    }

    #[tokio::test]
    async fn other_applications_do_not_count() {
        let creator = FakeCreator::with_images(vec![
            image(&ImageIdentity::new("acme", "api", "1")),
            image(&ImageIdentity::new("beta", "web", "1")),
        ]);
        assert_eq!(auto_revision("acme", "web", &creator).await.unwrap(), "1");
    }
}
