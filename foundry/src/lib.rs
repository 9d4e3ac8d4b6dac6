//! # Foundry
//!
//! Build, push and garbage-collect container images across several backends.
//!
//! An [`ImageCreator`] builds images with the local daemon, pushes them to a
//! registry and lists or deletes what the registry holds. Backends:
//!
//! - [`LocalImageCreator`]: the local daemon only
//! - [`RegistryImageCreator`]: a private Registry V2 server or GCR
//! - `EcrImageCreator`: AWS ECR, with the `ecr` feature
//!
//! [`Creator::from_config`] picks one from a [`FoundryConfig`]. Build and push
//! output arrives as a [`Progress`] stream. The [`reaper`] removes stale local
//! images and [`auto_revision`] numbers new builds.
//!
//! ```no_run
//! use foundry::{BuildRequest, Creator, FoundryConfig, ImageCreator, ImageIdentity};
//! use futures::StreamExt as _;
//!
//! # async fn example() -> Result<(), foundry::Error> {
//! let creator = Creator::from_config(&FoundryConfig::from_env()?).await?;
//!
//! let revision = foundry::auto_revision("acme", "web", &creator).await?;
//! let identity = ImageIdentity::new("acme", "web", revision);
//!
//! let mut build = creator
//!     .build_image(&BuildRequest::new("/tmp/context.tar", identity.clone()))
//!     .await?;
//! while let Some(line) = build.next().await {
//!     print!("{line}");
//! }
//!
//! let mut push = creator.push_image(&identity).await?;
//! while let Some(line) = push.next().await {
//!     println!("{line}");
//! }
//! println!("pushed {}", creator.repo_uri(&identity));
//! # Ok(())
//! # }
//! ```

pub mod config;
mod creator;
#[cfg(feature = "ecr")]
mod ecr;
mod error;
mod hosted;
mod identity;
mod image;
pub mod labels;
mod local;
pub mod reaper;
mod revision;
pub mod stream;

#[cfg(test)]
mod fake;

pub use self::config::{ConfigError, FoundryConfig, Provider};
pub use self::creator::{Creator, ImageCreator};
#[cfg(feature = "ecr")]
pub use self::ecr::EcrImageCreator;
pub use self::error::{Error, Result};
pub use self::hosted::RegistryImageCreator;
pub use self::identity::{BuildRequest, ImageIdentity, ParseRemoteImageError, RemoteImage};
pub use self::image::ManagedImage;
pub use self::local::LocalImageCreator;
pub use self::reaper::{reap, reap_forever, ReapSummary};
pub use self::revision::auto_revision;
pub use self::stream::{Progress, StreamKind};
