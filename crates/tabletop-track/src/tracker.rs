use log::debug;
use tabletop_core::Token;

#[cfg(feature = "tracing")]
use tracing::instrument;

use crate::{StabilityGate, TrackerParams};

#[derive(Clone, Debug)]
struct Track {
    /// Last matched state.
    token: Token,
    missed: u32,
    /// Matched again after a miss, waiting for its bucket to re-qualify.
    held: bool,
}

/// Assigns persistent ids to per-frame tokens.
///
/// New tokens are held back by the [`StabilityGate`] until their bucket has
/// been observed for `stability_threshold` consecutive frames. Once emitted,
/// a token keeps its id while a new observation lands within
/// `match_distance_px` of its last position, even across bucket borders.
/// A track that was missed in the previous frame keeps its id when it is
/// observed again, but it is only emitted once its bucket has passed the
/// gate again. Tracks unmatched for more than `max_missed_frames` are retired for good:
/// ids grow monotonically and are never handed out twice.
#[derive(Clone, Debug)]
pub struct TokenTracker {
    params: TrackerParams,
    gate: StabilityGate,
    tracks: Vec<Track>,
    next_id: u64,
}

impl Default for TokenTracker {
    fn default() -> Self {
        Self::new(TrackerParams::default())
    }
}

impl TokenTracker {
    pub fn new(params: TrackerParams) -> Self {
        Self {
            gate: StabilityGate::new(params.bucket_size_px),
            params,
            tracks: Vec::new(),
            next_id: 1,
        }
    }

    pub fn params(&self) -> &TrackerParams {
        &self.params
    }

    /// Live tracks, including ones missed in recent frames.
    pub fn tracks(&self) -> impl Iterator<Item = &Token> {
        self.tracks.iter().map(|t| &t.token)
    }

    pub fn track_count(&self) -> usize {
        self.tracks.len()
    }

    /// Reconcile one frame of fresh tokens and return the emitted ones by id.
    #[cfg_attr(
        feature = "tracing",
        instrument(level = "debug", skip(self, observed), fields(observed = observed.len(), tracks = self.tracks.len()))
    )]
    pub fn update(&mut self, observed: Vec<Token>) -> Vec<Token> {
        let p = &self.params;
        let counts = self.gate.observe(observed.iter().map(|t| t.position));

        let max_dist = p.match_distance_px;
        let mut pairs: Vec<(f32, usize, usize)> = Vec::new();
        for (ni, new) in observed.iter().enumerate() {
            for (ti, track) in self.tracks.iter().enumerate() {
                let d = new.distance_px(&track.token);
                if d < max_dist {
                    pairs.push((d, ni, ti));
                }
            }
        }
        pairs.sort_by(|a, b| a.0.total_cmp(&b.0).then(a.1.cmp(&b.1)).then(a.2.cmp(&b.2)));

        let mut new_match: Vec<Option<usize>> = vec![None; observed.len()];
        let mut track_hit = vec![false; self.tracks.len()];
        for &(_, ni, ti) in &pairs {
            if new_match[ni].is_some() || track_hit[ti] {
                continue;
            }
            new_match[ni] = Some(ti);
            track_hit[ti] = true;
        }

        let mut emitted = Vec::with_capacity(observed.len());
        let mut spawned = Vec::new();
        for (ni, mut token) in observed.into_iter().enumerate() {
            token.stability_frames = counts[ni];
            match new_match[ni] {
                Some(ti) => {
                    let track = &mut self.tracks[ti];
                    let resumed = track.missed > 0 || track.held;
                    inherit(&mut token, &track.token, p.history_len);
                    track.token = token.clone();
                    track.missed = 0;
                    track.held = resumed && token.stability_frames < p.stability_threshold;
                    if track.held {
                        debug!(
                            "track: id {} held back at ({:.1}, {:.1}), {} stable frames",
                            token.id, token.position.x, token.position.y, token.stability_frames
                        );
                    } else {
                        emitted.push(token);
                    }
                }
                None if token.stability_frames >= p.stability_threshold => {
                    token.id = self.next_id;
                    self.next_id += 1;
                    push_history(&mut token, p.history_len);
                    debug!(
                        "track: new id {} ({:?}) at ({:.1}, {:.1})",
                        token.id, token.kind, token.position.x, token.position.y
                    );
                    spawned.push(Track {
                        token: token.clone(),
                        missed: 0,
                        held: false,
                    });
                    emitted.push(token);
                }
                // below the stability threshold: not emitted, no identity yet
                None => {}
            }
        }

        let max_missed = p.max_missed_frames;
        let mut hit = track_hit.into_iter();
        self.tracks.retain_mut(|track| {
            if hit.next().unwrap_or(false) {
                return true;
            }
            track.missed += 1;
            if track.missed > max_missed {
                debug!("track: retired id {} after {} missed frames", track.token.id, track.missed);
                return false;
            }
            true
        });
        self.tracks.extend(spawned);

        emitted.sort_by_key(|t| t.id);
        emitted
    }

    /// Attach a label to a live track; `false` if the id is unknown.
    pub fn set_label(&mut self, id: u64, label: Option<String>) -> bool {
        self.track_mut(id).map(|t| t.label = label).is_some()
    }

    /// Attach a category to a live track; `false` if the id is unknown.
    pub fn set_category(&mut self, id: u64, category: Option<String>) -> bool {
        self.track_mut(id).map(|t| t.category = category).is_some()
    }

    fn track_mut(&mut self, id: u64) -> Option<&mut Token> {
        self.tracks
            .iter_mut()
            .find(|t| t.token.id == id)
            .map(|t| &mut t.token)
    }

    /// Drop every track and bucket counter.
    ///
    /// The id counter keeps running so old ids are not reused.
    pub fn reset(&mut self) {
        self.tracks.clear();
        self.gate.clear();
    }
}

/// Carry identity and annotations from `prev` into the fresh `token`.
fn inherit(token: &mut Token, prev: &Token, history_len: usize) {
    token.id = prev.id;
    token.label = prev.label.clone();
    token.category = prev.category.clone();
    token.color = prev.color.or(token.color);
    token.position_history = prev.position_history.clone();
    push_history(token, history_len);
}

fn push_history(token: &mut Token, history_len: usize) {
    token.position_history.push_back(token.position);
    while token.position_history.len() > history_len {
        token.position_history.pop_front();
    }
}
