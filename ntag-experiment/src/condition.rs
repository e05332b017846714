use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConditionError {
    #[error("unknown image set '{0}' (known: bw, grating)")]
    UnknownImageSet(String),
    #[error("unsupported class count {0} (supported: 5, 30)")]
    UnsupportedClassCount(usize),
    #[error("participant {0} out of range (0..{1})")]
    ParticipantOutOfRange(usize, usize),
}

/// Which tile faces a condition's keys flash through.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageSet {
    BlackWhite,
    Grating,
}

impl ImageSet {
    pub fn parse(name: &str) -> Result<Self, ConditionError> {
        match name {
            "bw" => Ok(ImageSet::BlackWhite),
            "grating" => Ok(ImageSet::Grating),
            other => Err(ConditionError::UnknownImageSet(other.to_string())),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            ImageSet::BlackWhite => "bw",
            ImageSet::Grating => "grating",
        }
    }

    /// Tile colors by code state: off, on, cue.
    pub fn variant_colors(&self) -> [&'static str; 3] {
        match self {
            ImageSet::BlackWhite => ["black", "white", "green"],
            ImageSet::Grating => ["gray", "grating", "green"],
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Condition {
    pub classes: usize,
    pub images: ImageSet,
}

impl Condition {
    pub fn new(classes: usize, images: ImageSet) -> Result<Self, ConditionError> {
        match classes {
            5 | 30 => Ok(Self { classes, images }),
            other => Err(ConditionError::UnsupportedClassCount(other)),
        }
    }

    /// Circular-shift stride of the m-sequence set: small grids get far
    /// apart shifts.
    pub fn shift_stride(&self) -> usize {
        match self.classes {
            5 => 12,
            _ => 2,
        }
    }

    pub fn label(&self) -> String {
        format!("{}-{}", self.images.name(), self.classes)
    }
}

/// Condition order per participant. Each row presents all four conditions
/// twice; rows 0-3 are rotations of the same base row.
const LATIN_SQUARE: [[u8; 8]; 6] = [
    [1, 2, 4, 3, 2, 3, 1, 4],
    [2, 3, 1, 4, 1, 2, 4, 3],
    [3, 4, 2, 1, 4, 1, 3, 2],
    [4, 1, 3, 2, 3, 4, 2, 1],
    [1, 2, 4, 3, 1, 2, 4, 3],
    [2, 3, 1, 4, 2, 3, 1, 4],
];

fn condition_for(index: u8) -> Condition {
    let (classes, images) = match index {
        1 => (30, ImageSet::BlackWhite),
        2 => (5, ImageSet::Grating),
        3 => (5, ImageSet::BlackWhite),
        _ => (30, ImageSet::Grating),
    };
    Condition { classes, images }
}

/// The participant's condition schedule, one entry per run.
pub fn schedule_for(participant: usize) -> Result<Vec<Condition>, ConditionError> {
    let row = LATIN_SQUARE.get(participant).ok_or(
        ConditionError::ParticipantOutOfRange(participant, LATIN_SQUARE.len()),
    )?;
    Ok(row.iter().map(|&i| condition_for(i)).collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn image_set_names_round_trip() {
        for set in [ImageSet::BlackWhite, ImageSet::Grating] {
            assert_eq!(ImageSet::parse(set.name()).unwrap(), set);
        }
        assert_eq!(
            ImageSet::parse("plaid"),
            Err(ConditionError::UnknownImageSet("plaid".into()))
        );
    }

    #[test]
    fn strides_cover_their_grids() {
        // 63-frame sequence: stride picks at least as many codes as keys.
        let c5 = Condition::new(5, ImageSet::BlackWhite).unwrap();
        let c30 = Condition::new(30, ImageSet::Grating).unwrap();
        assert!(63 / c5.shift_stride() >= 5);
        assert!(63 / c30.shift_stride() >= 30);
    }

    #[test]
    fn unsupported_class_counts_are_rejected() {
        assert_eq!(
            Condition::new(12, ImageSet::BlackWhite),
            Err(ConditionError::UnsupportedClassCount(12))
        );
    }

    #[test]
    fn every_participant_sees_each_condition_twice() {
        for participant in 0..6 {
            let schedule = schedule_for(participant).unwrap();
            assert_eq!(schedule.len(), 8);
            for target in 1..=4u8 {
                let expected = condition_for(target);
                let seen = schedule.iter().filter(|&&c| c == expected).count();
                assert_eq!(seen, 2, "participant {participant} condition {target}");
            }
        }
    }

    #[test]
    fn unknown_participants_are_rejected() {
        assert_eq!(
            schedule_for(6),
            Err(ConditionError::ParticipantOutOfRange(6, 6))
        );
    }
}
