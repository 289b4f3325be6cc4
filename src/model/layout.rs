use crate::model::song::{Digit, Modifier};

/// A playable pitch: the digit to press and the modifier held with it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LayoutKey {
    pub pitch: u8,
    pub digit: Digit,
    pub modifier: Modifier,
    /// human-readable note info for debugging
    pub note_label: &'static str,
}

const fn key(pitch: u8, digit: u8, modifier: Modifier, note_label: &'static str) -> LayoutKey {
    LayoutKey {
        pitch,
        digit: Digit::const_new(digit),
        modifier,
        note_label,
    }
}

// -----------------------------------------------------------------------------
// Three octaves of white keys over the number row:
// - space + 1..0 plays G2 .. B3
// - 1..0 plays C4 .. E5
// - shift + 1..0 plays F5 .. A6
// Entries must stay sorted by pitch; quantization relies on it.
// -----------------------------------------------------------------------------

pub const MAPPINGS: &[LayoutKey] = &[
    key(43, 1, Modifier::Space, "G2 (43)"),
    key(45, 2, Modifier::Space, "A2 (45)"),
    key(47, 3, Modifier::Space, "B2 (47)"),
    key(48, 4, Modifier::Space, "C3 (48)"),
    key(50, 5, Modifier::Space, "D3 (50)"),
    key(52, 6, Modifier::Space, "E3 (52)"),
    key(53, 7, Modifier::Space, "F3 (53)"),
    key(55, 8, Modifier::Space, "G3 (55)"),
    key(57, 9, Modifier::Space, "A3 (57)"),
    key(59, 0, Modifier::Space, "B3 (59)"),
    key(60, 1, Modifier::None, "C4 (60)"),
    key(62, 2, Modifier::None, "D4 (62)"),
    key(64, 3, Modifier::None, "E4 (64)"),
    key(65, 4, Modifier::None, "F4 (65)"),
    key(67, 5, Modifier::None, "G4 (67)"),
    key(69, 6, Modifier::None, "A4 (69)"),
    key(71, 7, Modifier::None, "B4 (71)"),
    key(72, 8, Modifier::None, "C5 (72)"),
    key(74, 9, Modifier::None, "D5 (74)"),
    key(76, 0, Modifier::None, "E5 (76)"),
    key(77, 1, Modifier::Shift, "F5 (77)"),
    key(79, 2, Modifier::Shift, "G5 (79)"),
    key(81, 3, Modifier::Shift, "A5 (81)"),
    key(83, 4, Modifier::Shift, "B5 (83)"),
    key(84, 5, Modifier::Shift, "C6 (84)"),
    key(86, 6, Modifier::Shift, "D6 (86)"),
    key(88, 7, Modifier::Shift, "E6 (88)"),
    key(89, 8, Modifier::Shift, "F6 (89)"),
    key(91, 9, Modifier::Shift, "G6 (91)"),
    key(93, 0, Modifier::Shift, "A6 (93)"),
];

/// Return the layout entry playing exactly this MIDI pitch, if present.
pub fn input_for_midi(midi: u8) -> Option<&'static LayoutKey> {
    MAPPINGS.iter().find(|k| k.pitch == midi)
}

/// Snap any MIDI pitch to the closest pitch of the layout.
///
/// Ties go to the lower pitch, so 61 lands on C4 rather than D4.
pub fn quantize(midi: u8) -> &'static LayoutKey {
    if let Some(exact) = input_for_midi(midi) {
        return exact;
    }

    // `min_by_key` keeps the first of equal minimums and MAPPINGS is ascending
    MAPPINGS
        .iter()
        .min_by_key(|k| (k.pitch as i16 - midi as i16).abs())
        .unwrap_or(&MAPPINGS[0])
}
