//! Greeting detection from hand landmarks.

use std::fmt;

/// Landmark count produced by a hand-tracking model.
pub const HAND_LANDMARKS: usize = 21;

const WRIST: usize = 0;
const FINGER_TIPS: [usize; 4] = [8, 12, 16, 20];

/// Text shown when no gesture is recognised.
pub const NO_GESTURE: &str = "...";

/// One landmark in normalised image coordinates; `y` grows downwards.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Landmark {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Gesture {
    Hello,
    Hi,
}

impl fmt::Display for Gesture {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Gesture::Hello => "Hello",
            Gesture::Hi => "Hi",
        })
    }
}

/// Classifies one hand: all four finger tips below the wrist is `Hello`,
/// all above is `Hi`. Anything else, including a short landmark list, is
/// unrecognised.
pub fn classify_hand(landmarks: &[Landmark]) -> Option<Gesture> {
    if landmarks.len() < HAND_LANDMARKS {
        return None;
    }
    let wrist = landmarks[WRIST].y;
    let tips = FINGER_TIPS.map(|idx| landmarks[idx].y);

    if tips.iter().all(|&y| y > wrist) {
        Some(Gesture::Hello)
    } else if tips.iter().all(|&y| y < wrist) {
        Some(Gesture::Hi)
    } else {
        None
    }
}

/// Display label for the last hand in a frame.
pub fn gesture_label(hands: &[Vec<Landmark>]) -> String {
    hands
        .last()
        .and_then(|hand| classify_hand(hand))
        .map_or_else(|| NO_GESTURE.to_string(), |gesture| gesture.to_string())
}
