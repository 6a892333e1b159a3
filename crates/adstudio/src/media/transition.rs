//! Scene-boundary transitions and their compositing effects.

use std::str::FromStr;

use super::MediaError;

/// One frame at the normalized 24 fps.
pub const FRAME_SECS: f64 = 1.0 / 24.0;

pub const MAX_TRANSITION_SECS: f64 = 2.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransitionKind {
    Cut,
    Dissolve,
    Fade,
    Wipe,
    Zoom,
    MatchCut,
    WhipPan,
}

impl TransitionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransitionKind::Cut => "cut",
            TransitionKind::Dissolve => "dissolve",
            TransitionKind::Fade => "fade",
            TransitionKind::Wipe => "wipe",
            TransitionKind::Zoom => "zoom",
            TransitionKind::MatchCut => "match_cut",
            TransitionKind::WhipPan => "whip_pan",
        }
    }

    /// ffmpeg `xfade` transition name.
    pub fn xfade_name(&self) -> &'static str {
        match self {
            TransitionKind::Cut => "fade",
            TransitionKind::Dissolve => "dissolve",
            TransitionKind::Fade => "fade",
            TransitionKind::Wipe => "wipeleft",
            TransitionKind::Zoom => "zoomin",
            TransitionKind::MatchCut => "dissolve",
            TransitionKind::WhipPan => "smoothleft",
        }
    }
}

impl FromStr for TransitionKind {
    type Err = MediaError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "cut" => Ok(TransitionKind::Cut),
            "dissolve" => Ok(TransitionKind::Dissolve),
            "fade" => Ok(TransitionKind::Fade),
            "wipe" => Ok(TransitionKind::Wipe),
            "zoom" => Ok(TransitionKind::Zoom),
            "match_cut" => Ok(TransitionKind::MatchCut),
            "whip_pan" => Ok(TransitionKind::WhipPan),
            _ => Err(MediaError::UnknownTransition(s.to_string())),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Transition {
    pub kind: TransitionKind,
    /// Seconds of overlap between the two clips.
    pub duration: f64,
}

impl Transition {
    /// A cut always lasts one frame; other kinds are clamped to
    /// one frame ..= two seconds.
    pub fn new(kind: TransitionKind, duration: f64) -> Self {
        let duration = match kind {
            TransitionKind::Cut => FRAME_SECS,
            _ if duration.is_nan() => FRAME_SECS,
            _ => duration.clamp(FRAME_SECS, MAX_TRANSITION_SECS),
        };
        Self { kind, duration }
    }

    pub fn cut() -> Self {
        Self::new(TransitionKind::Cut, 0.0)
    }

    pub fn parse(kind: &str, duration: f64) -> Result<Self, MediaError> {
        Ok(Self::new(kind.parse()?, duration))
    }

    pub fn is_cut(&self) -> bool {
        self.kind == TransitionKind::Cut
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_known_kinds() {
        for (name, xfade) in [
            ("cut", "fade"),
            ("dissolve", "dissolve"),
            ("fade", "fade"),
            ("wipe", "wipeleft"),
            ("zoom", "zoomin"),
            ("match_cut", "dissolve"),
            ("whip_pan", "smoothleft"),
        ] {
            let kind: TransitionKind = name.parse().unwrap();
            assert_eq!(kind.as_str(), name);
            assert_eq!(kind.xfade_name(), xfade);
        }
    }

    #[test]
    fn test_unknown_kind_fails_fast() {
        assert!(matches!(
            "spin".parse::<TransitionKind>(),
            Err(MediaError::UnknownTransition(name)) if name == "spin"
        ));
    }

    #[test]
    fn test_durations_are_clamped() {
        assert_eq!(Transition::cut().duration, FRAME_SECS);
        assert_eq!(Transition::new(TransitionKind::Cut, 1.5).duration, FRAME_SECS);
        assert_eq!(Transition::new(TransitionKind::Fade, 5.0).duration, 2.0);
        assert_eq!(Transition::new(TransitionKind::Fade, 0.0).duration, FRAME_SECS);
        assert_eq!(Transition::new(TransitionKind::Dissolve, 0.5).duration, 0.5);
    }
}
