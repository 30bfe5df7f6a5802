//! Simulated typing for finished summaries.
//!
//! The model returns every bullet at once; this module replays them one
//! character at a time as a sequence of [`StreamingState`] frames, with
//! human-looking pauses between characters and between bullets. Consumers
//! cannot tell the replay apart from a live token stream.

use futures::Stream;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use crate::core::config::TimingConfig;
use crate::core::models::StreamingState;

/// Starts a replay of `segments` paced by `timing`.
///
/// The replay ends early, without a complete frame, once `cancel` fires.
#[must_use]
pub fn simulate(
    segments: Vec<String>,
    timing: TimingConfig,
    cancel: CancellationToken,
) -> StreamingSimulation<StdRng> {
    StreamingSimulation::with_rng(segments, timing, cancel, StdRng::from_os_rng())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Cursor {
    /// Next frame reveals `prefix` (index into the segment's prefix ends) of `segment`.
    Typing { segment: usize, prefix: usize },
    /// Every character is out; the complete frame is next.
    Finishing,
    Done,
}

/// Single-pass, non-restartable replay of a finished summary.
#[derive(Debug)]
pub struct StreamingSimulation<R> {
    segments: Vec<String>,
    /// Byte offsets ending each character prefix, per segment. An empty
    /// segment has a single empty prefix.
    prefix_ends: Vec<Vec<usize>>,
    timing: TimingConfig,
    cancel: CancellationToken,
    rng: R,
    cursor: Cursor,
}

impl<R: Rng> StreamingSimulation<R> {
    /// Like [`simulate`], drawing character delays from `rng`.
    #[must_use]
    pub fn with_rng(
        segments: Vec<String>,
        timing: TimingConfig,
        cancel: CancellationToken,
        rng: R,
    ) -> Self {
        let prefix_ends = segments
            .iter()
            .map(|segment| {
                if segment.is_empty() {
                    vec![0]
                } else {
                    segment
                        .char_indices()
                        .map(|(idx, ch)| idx + ch.len_utf8())
                        .collect()
                }
            })
            .collect();

        let cursor = if segments.is_empty() {
            Cursor::Finishing
        } else {
            Cursor::Typing {
                segment: 0,
                prefix: 0,
            }
        };

        Self {
            segments,
            prefix_ends,
            timing,
            cancel,
            rng,
            cursor,
        }
    }

    /// Stops the replay. No further frames are produced.
    pub fn stop(&self) {
        self.cancel.cancel();
    }

    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.cursor == Cursor::Done
    }

    /// Waits for and returns the next frame, or `None` once the replay has
    /// completed or been stopped.
    pub async fn next_state(&mut self) -> Option<StreamingState> {
        if self.cancel.is_cancelled() {
            self.cursor = Cursor::Done;
            return None;
        }

        match self.cursor {
            Cursor::Done => None,
            Cursor::Finishing => {
                self.cursor = Cursor::Done;
                Some(self.complete_state())
            }
            Cursor::Typing { segment, prefix } => {
                let mut delay = self.char_delay();
                if prefix == 0 && segment > 0 {
                    delay += self.timing.inter_segment_pause();
                }
                if !self.pause(delay).await {
                    self.cursor = Cursor::Done;
                    return None;
                }

                let state = self.typing_state(segment, prefix);
                self.cursor = self.advance(segment, prefix);
                Some(state)
            }
        }
    }

    /// Adapts the replay into a [`Stream`] of frames.
    pub fn into_stream(self) -> impl Stream<Item = StreamingState> {
        futures::stream::unfold(self, |mut simulation| async move {
            let state = simulation.next_state().await?;
            Some((state, simulation))
        })
    }

    fn char_delay(&mut self) -> Duration {
        let min = self.timing.min_char_delay_ms;
        let max = self.timing.max_char_delay_ms.max(min);
        Duration::from_millis(self.rng.random_range(min..=max))
    }

    /// Sleeps for `delay` unless cancelled first. Returns `false` on cancel.
    async fn pause(&self, delay: Duration) -> bool {
        if delay.is_zero() {
            return !self.cancel.is_cancelled();
        }
        tokio::select! {
            biased;
            () = self.cancel.cancelled() => false,
            () = tokio::time::sleep(delay) => true,
        }
    }

    fn advance(&self, segment: usize, prefix: usize) -> Cursor {
        if prefix + 1 < self.prefix_ends[segment].len() {
            Cursor::Typing {
                segment,
                prefix: prefix + 1,
            }
        } else if segment + 1 < self.segments.len() {
            Cursor::Typing {
                segment: segment + 1,
                prefix: 0,
            }
        } else {
            Cursor::Finishing
        }
    }

    fn typing_state(&self, segment: usize, prefix: usize) -> StreamingState {
        let end = self.prefix_ends[segment][prefix];
        let current = self.segments[segment][..end].to_string();

        let bullet_points = self
            .segments
            .iter()
            .enumerate()
            .map(|(idx, text)| match idx.cmp(&segment) {
                std::cmp::Ordering::Less => text.clone(),
                std::cmp::Ordering::Equal => current.clone(),
                std::cmp::Ordering::Greater => String::new(),
            })
            .collect();

        StreamingState {
            is_complete: false,
            bullet_points,
            current_bullet_index: isize::try_from(segment).unwrap_or(isize::MAX),
            current_bullet_text: current,
        }
    }

    fn complete_state(&self) -> StreamingState {
        let Some(last) = self.segments.last() else {
            return StreamingState::empty_complete();
        };
        StreamingState {
            is_complete: true,
            bullet_points: self.segments.clone(),
            current_bullet_index: isize::try_from(self.segments.len() - 1).unwrap_or(isize::MAX),
            current_bullet_text: last.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;
    use tokio::time::Instant;

    fn seeded(segments: &[&str], timing: TimingConfig) -> StreamingSimulation<StdRng> {
        StreamingSimulation::with_rng(
            segments.iter().map(|s| (*s).to_string()).collect(),
            timing,
            CancellationToken::new(),
            StdRng::seed_from_u64(7),
        )
    }

    async fn collect(mut simulation: StreamingSimulation<StdRng>) -> Vec<StreamingState> {
        let mut states = Vec::new();
        while let Some(state) = simulation.next_state().await {
            states.push(state);
        }
        states
    }

    #[tokio::test]
    async fn empty_input_yields_single_complete_frame() {
        let states = collect(seeded(&[], TimingConfig::instant())).await;
        assert_eq!(states, vec![StreamingState::empty_complete()]);
    }

    #[tokio::test]
    async fn reveals_characters_in_order() {
        let states = collect(seeded(&["A", "BC"], TimingConfig::instant())).await;
        let frames: Vec<(isize, &str, Vec<&str>, bool)> = states
            .iter()
            .map(|s| {
                (
                    s.current_bullet_index,
                    s.current_bullet_text.as_str(),
                    s.bullet_points.iter().map(String::as_str).collect(),
                    s.is_complete,
                )
            })
            .collect();

        assert_eq!(
            frames,
            vec![
                (0, "A", vec!["A", ""], false),
                (1, "B", vec!["A", "B"], false),
                (1, "BC", vec!["A", "BC"], false),
                (1, "BC", vec!["A", "BC"], true),
            ]
        );
    }

    #[tokio::test]
    async fn multibyte_characters_are_revealed_whole() {
        let states = collect(seeded(&["né•"], TimingConfig::instant())).await;
        let texts: Vec<&str> = states.iter().map(|s| s.current_bullet_text.as_str()).collect();
        assert_eq!(texts, vec!["n", "né", "né•", "né•"]);
    }

    #[tokio::test]
    async fn empty_segment_still_gets_a_frame() {
        let states = collect(seeded(&["", "x"], TimingConfig::instant())).await;
        assert_eq!(states[0].current_bullet_index, 0);
        assert_eq!(states[0].current_bullet_text, "");
        assert_eq!(states.last().unwrap().bullet_points, vec!["", "x"]);
    }

    #[tokio::test(start_paused = true)]
    async fn delays_stay_within_configured_bounds() {
        let timing = TimingConfig {
            min_char_delay_ms: 10,
            max_char_delay_ms: 30,
            inter_segment_pause_ms: 500,
        };
        let mut simulation = seeded(&["ab", "c"], timing);

        let mut last = Instant::now();
        let mut gaps = Vec::new();
        while let Some(state) = simulation.next_state().await {
            let now = Instant::now();
            gaps.push((state.current_bullet_index, state.is_complete, now - last));
            last = now;
        }

        for (idx, (segment, complete, gap)) in gaps.iter().enumerate() {
            if *complete {
                assert_eq!(*gap, Duration::ZERO);
            } else if idx == 2 {
                assert_eq!(*segment, 1);
                assert!(*gap >= Duration::from_millis(510) && *gap <= Duration::from_millis(531));
            } else {
                assert!(*gap >= Duration::from_millis(10) && *gap <= Duration::from_millis(31));
            }
        }
    }

    #[tokio::test(start_paused = true)]
    async fn stop_ends_without_complete_frame() {
        let mut simulation = seeded(&["hello"], TimingConfig::default());
        let first = simulation.next_state().await.unwrap();
        assert_eq!(first.current_bullet_text, "h");

        simulation.stop();
        assert!(simulation.next_state().await.is_none());
        assert!(simulation.next_state().await.is_none());
        assert!(simulation.is_finished());
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_during_pause_yields_nothing_more() {
        let token = CancellationToken::new();
        let simulation = StreamingSimulation::with_rng(
            vec!["slow".to_string()],
            TimingConfig {
                min_char_delay_ms: 1_000,
                max_char_delay_ms: 1_000,
                inter_segment_pause_ms: 0,
            },
            token.clone(),
            StdRng::seed_from_u64(1),
        );

        let handle = tokio::spawn(collect(simulation));
        tokio::time::sleep(Duration::from_millis(1_500)).await;
        token.cancel();

        let states = handle.await.unwrap();
        assert_eq!(states.len(), 1);
        assert!(states.iter().all(|s| !s.is_complete));
    }

    #[tokio::test]
    async fn stream_adapter_matches_pull_api() {
        let streamed: Vec<StreamingState> = seeded(&["ab", "c"], TimingConfig::instant())
            .into_stream()
            .collect()
            .await;
        let pulled = collect(seeded(&["ab", "c"], TimingConfig::instant())).await;
        assert_eq!(streamed, pulled);
    }

    #[tokio::test]
    async fn every_frame_respects_ordering_invariant() {
        let segments = ["first bullet", "", "third"];
        let states = collect(seeded(&segments, TimingConfig::instant())).await;

        for state in &states {
            let Some(current) = state.current_index() else {
                panic!("index must be set for non-empty input");
            };
            for (idx, text) in state.bullet_points.iter().enumerate() {
                if idx < current {
                    assert_eq!(text, segments[idx]);
                } else if idx > current {
                    assert!(text.is_empty());
                } else {
                    assert!(segments[idx].starts_with(text.as_str()));
                    assert_eq!(text, &state.current_bullet_text);
                }
            }
        }
        assert_eq!(states.iter().filter(|s| s.is_complete).count(), 1);
    }
}
