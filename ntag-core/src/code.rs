use indexmap::IndexMap;
use serde::Serialize;
use thiserror::Error;

/// Register length of the default m-sequence generator.
pub const M_SEQUENCE_DEGREE: usize = 6;

/// Feedback taps of the default generator. Stages 6 and 5 of a Fibonacci
/// LFSR realize the primitive polynomial x^6 + x + 1, so the output is a
/// maximal-length sequence of period 2^6 - 1 = 63.
pub const M_SEQUENCE_TAPS: [usize; 2] = [6, 5];

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CodeError {
    #[error("code sequence must not be empty")]
    Empty,
    #[error("code for key '{key}' selects state {state} but the key has only {variants} image variants")]
    StateOutOfRange {
        key: String,
        state: u8,
        variants: usize,
    },
    #[error("code table names unknown key '{key}'")]
    UnknownKey { key: String },
}

/// Generates the default binary m-sequence (length 63, all-ones seed).
pub fn m_sequence() -> Vec<u8> {
    m_sequence_with(M_SEQUENCE_DEGREE, &M_SEQUENCE_TAPS)
}

/// Generates a binary maximal-length sequence from a Fibonacci LFSR.
///
/// `taps` are 1-based stage numbers; the output bit is the oldest stage and
/// the feedback bit is the XOR of the tapped stages. The seed is all ones.
/// The sequence has period 2^degree - 1 when the taps form a primitive
/// polynomial.
pub fn m_sequence_with(degree: usize, taps: &[usize]) -> Vec<u8> {
    assert!(degree >= 2, "LFSR register needs at least two stages");
    assert!(
        taps.iter().all(|&t| t >= 1 && t <= degree),
        "taps are 1-based stage numbers within the register"
    );

    let period = (1usize << degree) - 1;
    let mut register = vec![1u8; degree];
    let mut out = Vec::with_capacity(period);

    for _ in 0..period {
        out.push(register[degree - 1]);
        let feedback = taps.iter().fold(0u8, |acc, &t| acc ^ register[t - 1]);
        for i in (1..degree).rev() {
            register[i] = register[i - 1];
        }
        register[0] = feedback;
    }

    out
}

/// Builds the set of circular shifts of `code` with the given stride.
///
/// Row `r` is `code` rotated left by `r * stride`; the set holds
/// `code.len() / stride` rows. A 63-bit sequence yields 31 codes at
/// stride 2 and 5 codes at stride 12.
pub fn shift_set(code: &[u8], stride: usize) -> Vec<Vec<u8>> {
    assert!(stride >= 1, "shift stride must be at least 1");
    assert!(!code.is_empty(), "cannot shift an empty code");

    let rows = code.len() / stride;
    (0..rows)
        .map(|r| {
            let mut row = code.to_vec();
            row.rotate_left((r * stride) % code.len());
            row
        })
        .collect()
}

/// Repeats every element `factor` times, converting a sequence defined at
/// the presentation rate to one indexed at the frame rate.
pub fn upsample(code: &[u8], factor: usize) -> Vec<u8> {
    assert!(factor >= 1, "upsampling factor must be at least 1");
    code.iter()
        .flat_map(|&v| std::iter::repeat_n(v, factor))
        .collect()
}

/// Sequence for the photodiode stimulus timing tracker: two "on" frames
/// followed by enough "off" frames to outlast a trial.
pub fn stt_sequence(trial_secs: f32, rate_hz: u32) -> CodeSequence {
    let zeros = ((1.0 + trial_secs as f64) * rate_hz as f64).round() as usize;
    let mut values = vec![1u8, 1];
    values.extend(std::iter::repeat_n(0u8, zeros));
    CodeSequence::new(values).expect("stt sequence is never empty")
}

/// A fixed-length sequence of image-variant indices, indexed by frame
/// number modulo its length.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct CodeSequence(Vec<u8>);

impl CodeSequence {
    pub fn new(values: Vec<u8>) -> Result<Self, CodeError> {
        if values.is_empty() {
            return Err(CodeError::Empty);
        }
        Ok(Self(values))
    }

    /// The variant selected at `frame`: `values[frame mod len]`.
    pub fn at(&self, frame: usize) -> u8 {
        self.0[frame % self.0.len()]
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        false
    }

    pub fn values(&self) -> &[u8] {
        &self.0
    }

    /// Largest state named anywhere in the sequence.
    pub fn max_state(&self) -> u8 {
        *self.0.iter().max().expect("sequence is non-empty")
    }
}

/// Mapping from key name to code sequence, in insertion order.
///
/// Serializes as `{name: [states...]}`, which is the payload of the
/// `codes;{json}` marker.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(transparent)]
pub struct CodeTable {
    entries: IndexMap<String, CodeSequence>,
}

impl CodeTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts or replaces the sequence for `name`.
    pub fn set(&mut self, name: impl Into<String>, seq: CodeSequence) {
        self.entries.insert(name.into(), seq);
    }

    pub fn get(&self, name: &str) -> Option<&CodeSequence> {
        self.entries.get(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &CodeSequence)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Frame count implied by the table itself: the length of the first
    /// inserted sequence.
    pub fn natural_frames(&self) -> Option<usize> {
        self.entries.first().map(|(_, seq)| seq.len())
    }

    /// Checks every sequence against the number of image variants its key
    /// actually has. `variants_of` returns `None` for unknown keys.
    pub fn validate(&self, variants_of: impl Fn(&str) -> Option<usize>) -> Result<(), CodeError> {
        for (key, seq) in self.iter() {
            let variants = variants_of(key).ok_or_else(|| CodeError::UnknownKey {
                key: key.to_string(),
            })?;
            let state = seq.max_state();
            if (state as usize) >= variants {
                return Err(CodeError::StateOutOfRange {
                    key: key.to_string(),
                    state,
                    variants,
                });
            }
        }
        Ok(())
    }

    pub fn to_json(&self) -> String {
        serde_json::to_string(self).expect("code table serializes to JSON")
    }
}
