//! Video source adapters
//!
//! Normalizes the two playback backends behind one capability surface.
//! Only this layer is permitted to touch a backend's API directly; the
//! tracker, reconciler and lifecycle hooks see the [`SourceAdapter`]
//! trait and its notice stream.

pub mod embedded;
pub mod native;

pub use embedded::{EmbedBridge, EmbedCommand, EmbedHost, EmbedNotice, EmbedReadiness, EmbeddedPlayer};
pub use native::NativeElement;

use tokio::sync::broadcast;
use watchgate_common::events::PlaybackState;

/// Notices republished by an adapter on its broadcast channel
#[derive(Debug, Clone)]
pub enum SourceNotice {
    /// Normalized playback state transition
    StateChanged {
        old: PlaybackState,
        new: PlaybackState,
    },
    /// Duration metadata became known (seconds)
    DurationKnown(f64),
    /// Backend failed to initialize or lost its handle
    Failed { reason: String },
}

/// Capability surface shared by both backends
///
/// Control methods are synchronous and never fail loudly: a backend that
/// is not ready yet queues the command internally (see [`embedded`]).
pub trait SourceAdapter: Send + Sync {
    fn play(&self);
    fn pause(&self);
    fn seek(&self, seconds: f64);

    /// Current playhead in seconds; `None` when the backend has not
    /// reported a position yet
    fn current_time(&self) -> Option<f64>;

    /// Total duration in seconds, once metadata is known
    fn duration(&self) -> Option<f64>;

    /// Last normalized playback state
    fn state(&self) -> PlaybackState;

    /// Whether the backend handle is live and accepting commands now
    /// (as opposed to queuing them behind an initialization handshake)
    fn is_ready(&self) -> bool;

    /// Subscribe to normalized notices
    fn notices(&self) -> broadcast::Receiver<SourceNotice>;

    /// Detach listeners and stop internal tasks
    fn shutdown(&self);
}

/// Parsed video reference, deciding which backend serves it
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VideoSource {
    /// Third-party embeddable player, addressed by provider video id
    Embedded { embed_id: String },
    /// Directly hosted media file played by a native element
    Native { url: String },
    /// Reference matching neither backend; the engine mounts in a
    /// non-interactive state instead of crashing
    Unsupported { raw: String },
}

/// File extensions the native element accepts
const NATIVE_EXTENSIONS: &[&str] = &["mp4", "m4v", "webm", "ogv", "mov"];

impl VideoSource {
    /// Detect the backend for a raw video reference
    ///
    /// - `embed:<id>` or a bare provider id (digits) → embedded player
    /// - http(s)/file URL with a media extension → native element
    /// - anything else → unsupported
    pub fn parse(raw: &str) -> Self {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return VideoSource::Unsupported { raw: raw.into() };
        }

        if let Some(id) = trimmed.strip_prefix("embed:") {
            if !id.is_empty() {
                return VideoSource::Embedded {
                    embed_id: id.to_string(),
                };
            }
            return VideoSource::Unsupported { raw: raw.into() };
        }

        // Bare provider ids are numeric
        if trimmed.chars().all(|c| c.is_ascii_digit()) {
            return VideoSource::Embedded {
                embed_id: trimmed.to_string(),
            };
        }

        let lower = trimmed.to_ascii_lowercase();
        if lower.starts_with("http://") || lower.starts_with("https://") || lower.starts_with("file://")
        {
            // Ignore query/fragment when sniffing the extension
            let path = lower
                .split(['?', '#'])
                .next()
                .unwrap_or(&lower);
            if let Some(ext) = path.rsplit('.').next() {
                if NATIVE_EXTENSIONS.contains(&ext) {
                    return VideoSource::Native {
                        url: trimmed.to_string(),
                    };
                }
            }
        }

        VideoSource::Unsupported { raw: raw.into() }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn embed_scheme_refs_use_the_embedded_backend() {
        assert_eq!(
            VideoSource::parse("embed:987654321"),
            VideoSource::Embedded {
                embed_id: "987654321".into()
            }
        );
    }

    #[test]
    fn bare_numeric_ids_use_the_embedded_backend() {
        assert_eq!(
            VideoSource::parse("123456789"),
            VideoSource::Embedded {
                embed_id: "123456789".into()
            }
        );
    }

    #[test]
    fn media_urls_use_the_native_backend() {
        assert_eq!(
            VideoSource::parse("https://cdn.example.com/lessons/intro.mp4"),
            VideoSource::Native {
                url: "https://cdn.example.com/lessons/intro.mp4".into()
            }
        );
        assert_eq!(
            VideoSource::parse("https://cdn.example.com/intro.webm?token=abc"),
            VideoSource::Native {
                url: "https://cdn.example.com/intro.webm?token=abc".into()
            }
        );
    }

    #[test]
    fn malformed_refs_are_unsupported_not_fatal() {
        assert!(matches!(
            VideoSource::parse(""),
            VideoSource::Unsupported { .. }
        ));
        assert!(matches!(
            VideoSource::parse("embed:"),
            VideoSource::Unsupported { .. }
        ));
        assert!(matches!(
            VideoSource::parse("https://example.com/page.html"),
            VideoSource::Unsupported { .. }
        ));
        assert!(matches!(
            VideoSource::parse("not a video"),
            VideoSource::Unsupported { .. }
        ));
    }
}
