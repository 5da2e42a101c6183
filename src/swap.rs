use crate::error::MediaError;
use crate::extract::MediaUrls;
use crate::media::MediaKind;
use crate::probe::{ContentTypeProber, ProbeResult};
use tokio::time::Instant;
use tracing::{debug, warn};

/// Final slot assignment after probing both candidates.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlotAssignment {
    pub image: Option<String>,
    pub animation: Option<String>,
    /// Probe of whatever ended up in the image slot, when it succeeded.
    pub image_probe: Option<ProbeResult>,
    /// Probe of whatever ended up in the animation slot, when it succeeded.
    pub animation_probe: Option<ProbeResult>,
    pub swapped: bool,
}

#[derive(Clone)]
pub struct TypeSwapResolver {
    prober: ContentTypeProber,
}

impl TypeSwapResolver {
    pub fn new(prober: ContentTypeProber) -> Self {
        Self { prober }
    }

    /// Probes both slots concurrently and swaps them when the image slot holds
    /// the richer asset. Probe failures keep the original assignment; only an
    /// expired deadline is reported.
    pub async fn resolve(
        &self,
        urls: &MediaUrls,
        deadline: Instant,
    ) -> Result<SlotAssignment, MediaError> {
        let (image_probe, animation_probe) = tokio::join!(
            self.probe_slot(urls.image.as_deref(), deadline),
            self.probe_slot(urls.animation.as_deref(), deadline),
        );
        if matches!(image_probe, Err(MediaError::DeadlineExceeded))
            || matches!(animation_probe, Err(MediaError::DeadlineExceeded))
        {
            return Err(MediaError::DeadlineExceeded);
        }
        let keep = |image_probe: Option<ProbeResult>, animation_probe: Option<ProbeResult>| {
            SlotAssignment {
                image: urls.image.clone(),
                animation: urls.animation.clone(),
                image_probe,
                animation_probe,
                swapped: false,
            }
        };
        let (image_probe, animation_probe) = match (image_probe, animation_probe) {
            (Ok(image), Ok(animation)) => (image, animation),
            (image, animation) => {
                for (slot, result) in [("image", &image), ("animation", &animation)] {
                    if let Err(err) = result {
                        warn!(slot, error = %err, "probe failed, keeping slot assignment");
                    }
                }
                return Ok(keep(image.ok(), animation.ok()));
            }
        };
        if should_swap(image_probe.kind, animation_probe.kind) {
            debug!(
                image_kind = %image_probe.kind,
                animation_kind = %animation_probe.kind,
                "swapping image and animation slots"
            );
            return Ok(SlotAssignment {
                image: urls.animation.clone(),
                animation: urls.image.clone(),
                image_probe: Some(animation_probe),
                animation_probe: Some(image_probe),
                swapped: true,
            });
        }
        Ok(keep(Some(image_probe), Some(animation_probe)))
    }

    async fn probe_slot(
        &self,
        url: Option<&str>,
        deadline: Instant,
    ) -> Result<ProbeResult, MediaError> {
        match url {
            Some(url) => self.prober.probe(url, deadline).await,
            None => Ok(ProbeResult {
                kind: MediaKind::Unknown,
                content_type: String::new(),
                content_length: None,
            }),
        }
    }
}

/// The swap decision for two successfully probed kinds.
pub fn should_swap(image: MediaKind, animation: MediaKind) -> bool {
    if image.is_animation_like() && !animation.is_animation_like() {
        return true;
    }
    if !image.is_valid() || !animation.is_valid() {
        return false;
    }
    image.outranks(animation)
}
