//! Scripted conversation replay: a linear timeline of chat reveals.
//!
//! One task walks the script, sleeping between cues, and sends each reveal
//! on a channel. The [`ReplayHandle`] owns that task: cancelling or dropping
//! it stops the timeline so no reveal fires after the consumer is gone.

use std::time::Duration;

use rand::Rng;
use serde::Serialize;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Speaker {
    Member,
    Concierge,
}

/// One message in the script, revealed `after` the previous one.
#[derive(Debug, Clone)]
pub struct Cue {
    pub after: Duration,
    pub speaker: Speaker,
    pub text: String,
}

impl Cue {
    pub fn new(after_ms: u64, speaker: Speaker, text: &str) -> Self {
        Self {
            after: Duration::from_millis(after_ms),
            speaker,
            text: text.to_string(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Script {
    pub cues: Vec<Cue>,
    /// How long before a concierge message its typing indicator shows.
    pub typing_lead: Duration,
    /// Upper bound of random extra delay added to each cue.
    pub jitter: Duration,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ReplayEvent {
    Typing { speaker: Speaker },
    Message {
        index: usize,
        speaker: Speaker,
        text: String,
    },
    Finished,
}

/// Owns a running replay.
pub struct ReplayHandle {
    task: JoinHandle<()>,
}

impl ReplayHandle {
    /// Stop the timeline. Pending reveals never fire.
    pub fn cancel(&self) {
        self.task.abort();
    }
}

impl Drop for ReplayHandle {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// Start playing `script`. Events arrive on the returned receiver in script
/// order, ending with [`ReplayEvent::Finished`].
pub fn play(script: Script) -> (ReplayHandle, mpsc::Receiver<ReplayEvent>) {
    let (tx, rx) = mpsc::channel(script.cues.len() * 2 + 1);
    let task = tokio::spawn(async move {
        for (index, cue) in script.cues.into_iter().enumerate() {
            let wait = cue.after + random_jitter(script.jitter);

            if cue.speaker == Speaker::Concierge && !script.typing_lead.is_zero() {
                let lead = script.typing_lead.min(wait);
                tokio::time::sleep(wait - lead).await;
                if tx
                    .send(ReplayEvent::Typing {
                        speaker: cue.speaker,
                    })
                    .await
                    .is_err()
                {
                    return;
                }
                tokio::time::sleep(lead).await;
            } else {
                tokio::time::sleep(wait).await;
            }

            let event = ReplayEvent::Message {
                index,
                speaker: cue.speaker,
                text: cue.text,
            };
            if tx.send(event).await.is_err() {
                debug!(index, "Replay consumer went away");
                return;
            }
        }
        let _ = tx.send(ReplayEvent::Finished).await;
    });
    (ReplayHandle { task }, rx)
}

fn random_jitter(max: Duration) -> Duration {
    if max.is_zero() {
        return Duration::ZERO;
    }
    let ms = rand::thread_rng().gen_range(0..=max.as_millis() as u64);
    Duration::from_millis(ms)
}

/// The landing page's demo exchange between a member and their concierge.
pub fn concierge_script() -> Script {
    use Speaker::*;
    Script {
        cues: vec![
            Cue::new(
                600,
                Member,
                "Can you get us a table at Le Cinq tonight? Party of four.",
            ),
            Cue::new(
                1800,
                Concierge,
                "Of course. 8:30 in the main dining room, window side.",
            ),
            Cue::new(
                1400,
                Concierge,
                "A car will collect you at 8:00. Shall I arrange flowers for the table?",
            ),
            Cue::new(1500, Member, "Yes please. White peonies if possible."),
            Cue::new(
                1600,
                Concierge,
                "Done. White peonies confirmed. Enjoy your evening.",
            ),
        ],
        typing_lead: Duration::from_millis(900),
        jitter: Duration::from_millis(250),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn quick_script() -> Script {
        Script {
            cues: vec![
                Cue::new(5, Speaker::Member, "hello"),
                Cue::new(10, Speaker::Concierge, "good evening"),
                Cue::new(5, Speaker::Member, "thanks"),
            ],
            typing_lead: Duration::from_millis(5),
            jitter: Duration::ZERO,
        }
    }

    #[tokio::test]
    async fn plays_in_order_with_typing_indicator() {
        let (_handle, mut rx) = play(quick_script());
        let mut events = Vec::new();
        while let Some(event) = rx.recv().await {
            events.push(event);
        }

        assert_eq!(
            events,
            vec![
                ReplayEvent::Message {
                    index: 0,
                    speaker: Speaker::Member,
                    text: "hello".into()
                },
                ReplayEvent::Typing {
                    speaker: Speaker::Concierge
                },
                ReplayEvent::Message {
                    index: 1,
                    speaker: Speaker::Concierge,
                    text: "good evening".into()
                },
                ReplayEvent::Message {
                    index: 2,
                    speaker: Speaker::Member,
                    text: "thanks".into()
                },
                ReplayEvent::Finished,
            ]
        );
    }

    #[tokio::test]
    async fn cancel_stops_pending_reveals() {
        let script = Script {
            cues: vec![
                Cue::new(0, Speaker::Member, "first"),
                Cue::new(10_000, Speaker::Member, "never"),
            ],
            typing_lead: Duration::ZERO,
            jitter: Duration::ZERO,
        };
        let (handle, mut rx) = play(script);

        let first = rx.recv().await.unwrap();
        assert!(matches!(first, ReplayEvent::Message { index: 0, .. }));

        handle.cancel();
        // Sender is dropped with the aborted task, so the channel closes.
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn dropping_handle_cancels() {
        let script = Script {
            cues: vec![Cue::new(10_000, Speaker::Concierge, "never")],
            typing_lead: Duration::from_millis(100),
            jitter: Duration::ZERO,
        };
        let (handle, mut rx) = play(script);
        drop(handle);
        assert!(rx.recv().await.is_none());
    }

    #[test]
    fn jitter_is_bounded() {
        for _ in 0..100 {
            assert!(random_jitter(Duration::from_millis(20)) <= Duration::from_millis(20));
        }
        assert_eq!(random_jitter(Duration::ZERO), Duration::ZERO);
    }

    #[test]
    fn demo_script_opens_with_member_and_ends_with_concierge() {
        let script = concierge_script();
        let speakers: Vec<Speaker> = script.cues.iter().map(|c| c.speaker).collect();
        assert_eq!(
            speakers,
            vec![
                Speaker::Member,
                Speaker::Concierge,
                Speaker::Concierge,
                Speaker::Member,
                Speaker::Concierge,
            ]
        );
    }
}
