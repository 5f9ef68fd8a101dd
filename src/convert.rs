//! Note name and frequency conversions.
//!
//! Octave numbering follows the MIDI convention where `C4 = 60` (middle C),
//! so `C3` is 130.81 Hz and `A4` is 440 Hz. Other ecosystems number octaves
//! one lower; callers that care about the absolute span should check the
//! resolved frequencies numerically instead of trusting the note name.

pub(crate) const A4_HZ: f32 = 440.0;
pub(crate) const MIDI_A4: f32 = 69.0;

const NOTE_MAP: [(&str, i32); 17] = [
    ("C", 0),
    ("C#", 1),
    ("DB", 1),
    ("D", 2),
    ("D#", 3),
    ("EB", 3),
    ("E", 4),
    ("F", 5),
    ("F#", 6),
    ("GB", 6),
    ("G", 7),
    ("G#", 8),
    ("AB", 8),
    ("A", 9),
    ("A#", 10),
    ("BB", 10),
    ("B", 11),
];

/// Convert a note name such as `"C3"`, `"F#4"` or `"Bb-1"` to a MIDI number.
///
/// Returns `None` for anything that does not parse.
///
/// # Example
/// ```
/// use cqtstore::convert::note_to_midi;
///
/// assert_eq!(note_to_midi("C4"), Some(60));
/// assert_eq!(note_to_midi("a4"), Some(69));
/// assert_eq!(note_to_midi("H2"), None);
/// ```
pub fn note_to_midi(note: &str) -> Option<i32> {
    let note = note.trim().to_uppercase();
    let split = note.find(|c: char| c.is_ascii_digit() || c == '-')?;
    let (pitch, octave) = note.split_at(split);
    let octave: i32 = octave.parse().ok()?;
    NOTE_MAP
        .iter()
        .find(|&&(name, _)| name == pitch)
        .map(|&(_, offset)| (octave + 1) * 12 + offset)
}

/// Frequency in Hz of a MIDI note number.
pub fn midi_to_hz(midi: f32) -> f32 {
    A4_HZ * 2.0f32.powf((midi - MIDI_A4) / 12.0)
}

/// Frequency in Hz of a note name.
///
/// # Example
/// ```
/// use cqtstore::convert::note_to_hz;
///
/// let c3 = note_to_hz("C3").unwrap();
/// assert!((c3 - 130.81).abs() < 0.01);
/// ```
pub fn note_to_hz(note: &str) -> Option<f32> {
    note_to_midi(note).map(|midi| midi_to_hz(midi as f32))
}

/// Center frequencies of `n_bins` constant-Q bins starting at `fmin`.
pub fn cqt_frequencies(n_bins: usize, fmin: f32, bins_per_octave: usize) -> Vec<f32> {
    (0..n_bins)
        .map(|i| fmin * 2.0_f32.powf(i as f32 / bins_per_octave as f32))
        .collect()
}
