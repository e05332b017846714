use ntag_core::code::{self, CodeError, CodeSequence, CodeTable};
use ntag_core::layout::{self, LayoutError};
use rand::Rng;
use rand::seq::SliceRandom;
use thiserror::Error;

use crate::condition::{Condition, ConditionError};
use crate::config::SessionConfig;

/// Name of the photodiode stimulus timing tracker key.
pub const STT_KEY: &str = "stt";

/// The quit flag is honored every this many frames of a running segment.
pub const QUIT_POLL_FRAMES: usize = 60;

#[derive(Debug, Error)]
pub enum SessionError {
    #[error(transparent)]
    Layout(#[from] LayoutError),
    #[error(transparent)]
    Condition(#[from] ConditionError),
    #[error(transparent)]
    Code(#[from] CodeError),
    #[error("shift set yields {available} codes but the grid has {needed} keys")]
    NotEnoughCodes { available: usize, needed: usize },
}

/// How long a segment runs: an explicit duration, or the length of the
/// first sequence in its code table.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FrameCount {
    Natural,
    Seconds(f32),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SegmentKind {
    RunStart,
    Cue { trial: usize },
    Flash { trial: usize },
    RunStop,
}

/// One invocation of the multiplexed display loop: a code table, a total
/// frame count and the markers bracketing it.
#[derive(Debug)]
struct Segment {
    kind: SegmentKind,
    table: CodeTable,
    total_frames: usize,
    frame: usize,
    start_marker: Option<String>,
    stop_marker: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    AwaitingStart,
    Running,
    AwaitingEnd,
    Finished,
}

/// State machine of one condition run: wait for the participant, highlight,
/// then cue/flash each trial, highlight again, wait again.
///
/// The driving loop asks for a frame plan, commits it to the display, and
/// reports the commit back via [`SpellerSession::after_flip`]; every marker
/// the run emits is returned from `begin` or `after_flip` in push order.
pub struct SpellerSession {
    config: SessionConfig,
    condition: Condition,
    grid: &'static [&'static [&'static str]],
    ordered: Vec<&'static str>,
    flash_table: CodeTable,
    highlight_table: CodeTable,
    trial_list: Vec<usize>,
    state: SessionState,
    segment: Option<Segment>,
    field_text: String,
}

impl SpellerSession {
    pub fn new(
        config: SessionConfig,
        condition: Condition,
        rng: &mut impl Rng,
    ) -> Result<Self, SessionError> {
        let grid = layout::grid_for_classes(condition.classes)?;
        let ordered = layout::ordered_keys(grid);
        let trial_list = make_trial_list(config.n_trials, condition.classes, rng);

        let mut highlight_table = CodeTable::new();
        for &key in &ordered {
            highlight_table.set(key, CodeSequence::new(vec![0])?);
        }
        highlight_table.set(STT_KEY, CodeSequence::new(vec![0])?);

        Ok(Self {
            config,
            condition,
            grid,
            ordered,
            flash_table: CodeTable::new(),
            highlight_table,
            trial_list,
            state: SessionState::AwaitingStart,
            segment: None,
            field_text: "Press button to start.".to_string(),
        })
    }

    /// Starts the run after the participant's keypress. The measured
    /// refresh rate sizes the stt sequence; durations use the nominal
    /// rate. Returns the markers to push before the first highlight frame.
    pub fn begin(&mut self, measured_hz: u32) -> Result<Vec<String>, SessionError> {
        debug_assert_eq!(self.state, SessionState::AwaitingStart);

        let base = code::m_sequence();
        let rows = code::shift_set(&base, self.condition.shift_stride());
        if rows.len() < self.ordered.len() {
            return Err(SessionError::NotEnoughCodes {
                available: rows.len(),
                needed: self.ordered.len(),
            });
        }

        let factor = self.config.upsample_factor();
        let mut flash_table = CodeTable::new();
        for (&key, row) in self.ordered.iter().zip(rows) {
            flash_table.set(key, CodeSequence::new(code::upsample(&row, factor))?);
        }
        flash_table.set(
            STT_KEY,
            code::stt_sequence(self.config.trial_secs, measured_hz),
        );
        self.flash_table = flash_table;

        let markers = vec![
            format!(
                "condition;classes={};images={}",
                self.condition.classes,
                self.condition.images.name()
            ),
            format!("codes;{}", self.flash_table.to_json()),
            "start_run".to_string(),
        ];

        self.field_text = "Starting...".to_string();
        self.state = SessionState::Running;
        self.segment = Some(self.highlight_segment(SegmentKind::RunStart));
        Ok(markers)
    }

    /// The variant every key shows this frame. Outside a running segment
    /// every key rests on its default variant.
    pub fn frame_plan(&self) -> Vec<(&'static str, u8)> {
        let mut plan = Vec::with_capacity(self.ordered.len() + 1);
        for &key in self.ordered.iter().chain(std::iter::once(&STT_KEY)) {
            let variant = match (&self.state, &self.segment) {
                (SessionState::Running, Some(seg)) => {
                    seg.table.get(key).map(|s| s.at(seg.frame)).unwrap_or(0)
                }
                _ => 0,
            };
            plan.push((key, variant));
        }
        plan
    }

    /// Reports that the planned frame was committed to the display.
    /// Returns the markers due at this flip: the segment's start marker on
    /// its first frame, its stop marker (plus any segment-entry markers)
    /// after its last.
    pub fn after_flip(&mut self) -> Vec<String> {
        let mut markers = Vec::new();
        if self.state != SessionState::Running {
            return markers;
        }
        let Some(seg) = self.segment.as_mut() else {
            return markers;
        };

        if seg.frame == 0 {
            if let Some(start) = seg.start_marker.take() {
                markers.push(start);
            }
        }
        seg.frame += 1;
        if seg.frame >= seg.total_frames {
            if let Some(stop) = seg.stop_marker.take() {
                markers.push(stop);
            }
            markers.extend(self.advance_segment());
        }
        markers
    }

    fn advance_segment(&mut self) -> Vec<String> {
        let kind = self.segment.as_ref().map(|s| s.kind);
        match kind {
            Some(SegmentKind::RunStart) => {
                self.field_text.clear();
                self.segment = Some(self.cue_segment(0));
                Vec::new()
            }
            Some(SegmentKind::Cue { trial }) => {
                self.segment = Some(self.flash_segment(trial));
                Vec::new()
            }
            Some(SegmentKind::Flash { trial }) => {
                let next = trial + 1;
                if next < self.trial_list.len() {
                    self.segment = Some(self.cue_segment(next));
                    Vec::new()
                } else {
                    self.field_text = "Stopping...".to_string();
                    self.segment = Some(self.highlight_segment(SegmentKind::RunStop));
                    vec!["stop_run".to_string()]
                }
            }
            Some(SegmentKind::RunStop) => {
                self.state = SessionState::AwaitingEnd;
                self.field_text = "Press button to continue.".to_string();
                self.segment = None;
                Vec::new()
            }
            None => Vec::new(),
        }
    }

    fn highlight_segment(&self, kind: SegmentKind) -> Segment {
        let table = self.highlight_table.clone();
        let total = self.resolve_frames(FrameCount::Seconds(self.config.highlight_secs), &table);
        Segment {
            kind,
            table,
            total_frames: total,
            frame: 0,
            start_marker: None,
            stop_marker: None,
        }
    }

    fn cue_segment(&self, trial: usize) -> Segment {
        let target = self.trial_list[trial];
        let key = self.ordered[target];
        let mut table = self.highlight_table.clone();
        table.set(key, CodeSequence::new(vec![2]).expect("cue sequence"));
        let total = self.resolve_frames(FrameCount::Seconds(self.config.cue_secs), &table);
        Segment {
            kind: SegmentKind::Cue { trial },
            table,
            total_frames: total,
            frame: 0,
            start_marker: Some(format!(
                "start_cue;trial={trial};target={target};key={key}"
            )),
            stop_marker: Some(format!("stop_cue;trial={trial}")),
        }
    }

    fn flash_segment(&self, trial: usize) -> Segment {
        let table = self.flash_table.clone();
        let total = self.resolve_frames(FrameCount::Seconds(self.config.trial_secs), &table);
        Segment {
            kind: SegmentKind::Flash { trial },
            table,
            total_frames: total,
            frame: 0,
            start_marker: Some(format!("start_trial;trial={trial}")),
            stop_marker: Some(format!("stop_trial;trial={trial}")),
        }
    }

    fn resolve_frames(&self, count: FrameCount, table: &CodeTable) -> usize {
        match count {
            FrameCount::Seconds(secs) => self.config.frames_for(secs),
            FrameCount::Natural => table.natural_frames().unwrap_or(0),
        }
    }

    /// Participant pressed the continue key after the run.
    pub fn finish(&mut self) {
        if self.state == SessionState::AwaitingEnd {
            self.state = SessionState::Finished;
            self.field_text.clear();
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn segment_kind(&self) -> Option<SegmentKind> {
        self.segment.as_ref().map(|s| s.kind)
    }

    pub fn field_text(&self) -> &str {
        &self.field_text
    }

    pub fn condition(&self) -> &Condition {
        &self.condition
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn grid(&self) -> &'static [&'static [&'static str]] {
        self.grid
    }

    pub fn ordered_keys(&self) -> &[&'static str] {
        &self.ordered
    }

    pub fn trial_count(&self) -> usize {
        self.trial_list.len()
    }

    /// Target key of a trial, for logging.
    pub fn target_key(&self, trial: usize) -> Option<&'static str> {
        self.trial_list.get(trial).map(|&t| self.ordered[t])
    }

    /// Trial progress for the active cue/flash segment.
    pub fn trial_progress(&self) -> Option<(usize, usize, &'static str)> {
        match self.segment_kind() {
            Some(SegmentKind::Cue { trial }) | Some(SegmentKind::Flash { trial }) => {
                Some((trial + 1, self.trial_list.len(), self.target_key(trial)?))
            }
            _ => None,
        }
    }

    /// Checks that every key the session will drive has enough image
    /// variants: grid keys cycle through off/on/cue states, the stt
    /// toggles off/on. Catches a mismatched tile set before any code
    /// indexes past a key's variant list.
    pub fn validate_keys(
        &self,
        variants_of: impl Fn(&str) -> Option<usize>,
    ) -> Result<(), CodeError> {
        let required = [(STT_KEY, 2usize)];
        let grid_keys = self.ordered.iter().map(|&k| (k, 3usize));
        for (key, needed) in grid_keys.chain(required) {
            let variants = variants_of(key).ok_or_else(|| CodeError::UnknownKey {
                key: key.to_string(),
            })?;
            if variants < needed {
                return Err(CodeError::StateOutOfRange {
                    key: key.to_string(),
                    state: (needed - 1) as u8,
                    variants,
                });
            }
        }
        Ok(())
    }

    /// Tile file names per key, in code-state order. Grid keys flash
    /// through the condition's colors; the stt toggles black/white.
    pub fn key_variant_files(&self) -> Vec<(&'static str, Vec<String>)> {
        let mut files: Vec<(&'static str, Vec<String>)> = self
            .ordered
            .iter()
            .map(|&key| {
                let variants = self
                    .condition
                    .images
                    .variant_colors()
                    .iter()
                    .map(|color| format!("{key}_{color}.png"))
                    .collect();
                (key, variants)
            })
            .collect();
        files.push((
            STT_KEY,
            vec!["black.png".to_string(), "white.png".to_string()],
        ));
        files
    }
}

fn make_trial_list(n_trials: usize, classes: usize, rng: &mut impl Rng) -> Vec<usize> {
    let reps = n_trials.div_ceil(classes);
    let mut list: Vec<usize> = (0..classes)
        .flat_map(|c| std::iter::repeat_n(c, reps))
        .collect();
    list.shuffle(rng);
    list.truncate(n_trials);
    list
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::condition::ImageSet;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    fn quick_config() -> SessionConfig {
        SessionConfig {
            n_trials: 2,
            cue_secs: 0.2,
            trial_secs: 0.5,
            highlight_secs: 0.3,
            frame_rate_hz: 10,
            presentation_rate_hz: 10,
            ..SessionConfig::default()
        }
    }

    fn quick_session() -> SpellerSession {
        let mut rng = StdRng::seed_from_u64(7);
        SpellerSession::new(
            quick_config(),
            Condition::new(5, ImageSet::BlackWhite).unwrap(),
            &mut rng,
        )
        .unwrap()
    }

    /// Runs the session to completion, returning every marker in push
    /// order and the number of committed frames.
    fn drive(session: &mut SpellerSession) -> (Vec<String>, usize) {
        let mut markers = session.begin(10).unwrap();
        let mut frames = 0;
        while session.state() == SessionState::Running {
            let _plan = session.frame_plan();
            frames += 1;
            markers.extend(session.after_flip());
            assert!(frames < 10_000, "session failed to terminate");
        }
        (markers, frames)
    }

    #[test]
    fn trial_list_balances_classes() {
        let mut rng = StdRng::seed_from_u64(1);
        let list = make_trial_list(30, 5, &mut rng);
        assert_eq!(list.len(), 30);
        for class in 0..5 {
            assert_eq!(list.iter().filter(|&&c| c == class).count(), 6);
        }
    }

    #[test]
    fn truncated_trial_list_never_exceeds_n_trials() {
        let mut rng = StdRng::seed_from_u64(2);
        let list = make_trial_list(7, 5, &mut rng);
        assert_eq!(list.len(), 7);
        assert!(list.iter().all(|&c| c < 5));
    }

    #[test]
    fn run_emits_one_start_and_one_stop_per_segment_in_order() {
        let mut session = quick_session();
        let (markers, frames) = drive(&mut session);

        // 3 highlight + 2 * (2 cue + 5 flash) + 3 highlight
        assert_eq!(frames, 20);
        assert_eq!(session.state(), SessionState::AwaitingEnd);

        let names: Vec<&str> = markers
            .iter()
            .map(|m| m.split(';').next().unwrap())
            .collect();
        assert_eq!(
            names,
            vec![
                "condition",
                "codes",
                "start_run",
                "start_cue",
                "stop_cue",
                "start_trial",
                "stop_trial",
                "start_cue",
                "stop_cue",
                "start_trial",
                "stop_trial",
                "stop_run",
            ]
        );
    }

    #[test]
    fn flash_frames_follow_the_code_table() {
        let mut session = quick_session();
        session.begin(10).unwrap();

        // Skip the opening highlight and the first cue.
        for _ in 0..5 {
            session.after_flip();
        }
        assert_eq!(session.segment_kind(), Some(SegmentKind::Flash { trial: 0 }));

        let flash_table = session.flash_table.clone();
        for frame in 0..5 {
            for (key, variant) in session.frame_plan() {
                let seq = flash_table.get(key).unwrap();
                assert_eq!(variant, seq.at(frame), "key {key} frame {frame}");
            }
            session.after_flip();
        }
    }

    #[test]
    fn cue_highlights_only_the_target() {
        let mut session = quick_session();
        session.begin(10).unwrap();
        for _ in 0..3 {
            session.after_flip();
        }
        let Some(SegmentKind::Cue { trial: 0 }) = session.segment_kind() else {
            panic!("expected first cue");
        };
        let target = session.target_key(0).unwrap();
        for (key, variant) in session.frame_plan() {
            if key == target {
                assert_eq!(variant, 2);
            } else {
                assert_eq!(variant, 0);
            }
        }
    }

    #[test]
    fn cue_markers_name_the_target() {
        let mut session = quick_session();
        let (markers, _) = drive(&mut session);
        let target = session.target_key(0).unwrap();
        let cue = markers.iter().find(|m| m.starts_with("start_cue")).unwrap();
        assert!(cue.contains("trial=0"));
        assert!(cue.ends_with(&format!("key={target}")));
    }

    #[test]
    fn codes_marker_carries_the_json_table() {
        let mut session = quick_session();
        let markers = session.begin(10).unwrap();
        let codes = markers.iter().find(|m| m.starts_with("codes;")).unwrap();
        let json = &codes["codes;".len()..];
        let parsed: serde_json::Value = serde_json::from_str(json).unwrap();
        assert!(parsed.get("stt").is_some());
        assert_eq!(
            parsed.get("W").unwrap().as_array().unwrap().len(),
            63,
            "per-key code is the upsampled m-sequence"
        );
    }

    #[test]
    fn stt_flashes_twice_then_stays_dark() {
        let mut session = quick_session();
        session.begin(10).unwrap();
        let stt = session.flash_table.get(STT_KEY).unwrap();
        assert_eq!(stt.at(0), 1);
        assert_eq!(stt.at(1), 1);
        for frame in 2..stt.len() {
            assert_eq!(stt.values()[frame], 0);
        }
        // Sized by the measured rate: 2 on-frames plus (1 + 0.5 s) * 10 Hz.
        assert_eq!(stt.len(), 2 + 15);
    }

    #[test]
    fn idle_plan_rests_every_key() {
        let session = quick_session();
        assert_eq!(session.state(), SessionState::AwaitingStart);
        for (_, variant) in session.frame_plan() {
            assert_eq!(variant, 0);
        }
    }

    #[test]
    fn finish_requires_the_run_to_be_over() {
        let mut session = quick_session();
        session.finish();
        assert_eq!(session.state(), SessionState::AwaitingStart);
        drive(&mut session);
        session.finish();
        assert_eq!(session.state(), SessionState::Finished);
    }

    #[test]
    fn variant_files_use_stems_and_condition_colors() {
        let mut rng = StdRng::seed_from_u64(3);
        let session = SpellerSession::new(
            quick_config(),
            Condition::new(30, ImageSet::Grating).unwrap(),
            &mut rng,
        )
        .unwrap();
        let files = session.key_variant_files();
        let (_, question) = files
            .iter()
            .find(|(key, _)| *key == "question")
            .expect("question key present");
        assert_eq!(
            question,
            &vec![
                "question_gray.png".to_string(),
                "question_grating.png".to_string(),
                "question_green.png".to_string()
            ]
        );
        let (_, stt) = files.last().unwrap();
        assert_eq!(stt, &vec!["black.png".to_string(), "white.png".to_string()]);
    }

    #[test]
    fn key_validation_needs_three_variants_per_grid_key() {
        let session = quick_session();
        assert!(session.validate_keys(|_| Some(3)).is_ok());

        let err = session.validate_keys(|_| Some(2)).unwrap_err();
        assert!(matches!(err, CodeError::StateOutOfRange { state: 2, .. }));

        let err = session
            .validate_keys(|name| (name != "stt").then_some(3))
            .unwrap_err();
        assert!(matches!(err, CodeError::UnknownKey { .. }));
    }

    #[test]
    fn natural_frame_count_falls_back_to_the_table() {
        let mut session = quick_session();
        session.begin(10).unwrap();
        let total = session.resolve_frames(FrameCount::Natural, &session.flash_table);
        assert_eq!(total, 63);
    }
}
