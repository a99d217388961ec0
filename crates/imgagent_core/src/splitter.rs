//! Text splitting for the document creation path.
//!
//! The text is cut on a separator into pieces, and pieces are packed
//! greedily into chunks no longer than `chunk_size` characters. Each new
//! chunk starts with the trailing pieces of the previous one, up to
//! `chunk_overlap` characters, so a scene straddling a boundary is not lost.

use serde::{Deserialize, Serialize};

/// Options for [`split_text`].
///
/// # Examples
///
/// ```
/// use imgagent_core::SplitOptions;
///
/// let options = SplitOptions::builder()
///     .chunk_size(500)
///     .chunk_overlap(0)
///     .build()
///     .unwrap();
/// assert_eq!(*options.chunk_size(), 500);
/// assert_eq!(options.separator(), "\n\n");
/// ```
#[derive(
    Debug,
    Clone,
    PartialEq,
    Eq,
    Serialize,
    Deserialize,
    derive_getters::Getters,
    derive_builder::Builder,
)]
#[builder(default)]
#[serde(default)]
pub struct SplitOptions {
    /// Maximum chunk length in characters
    chunk_size: usize,
    /// Characters carried over from the end of the previous chunk
    chunk_overlap: usize,
    /// Separator the text is cut on
    #[builder(setter(into))]
    separator: String,
}

impl Default for SplitOptions {
    fn default() -> Self {
        Self {
            chunk_size: 2000,
            chunk_overlap: 100,
            separator: "\n\n".to_string(),
        }
    }
}

impl SplitOptions {
    /// Creates a new options builder.
    pub fn builder() -> SplitOptionsBuilder {
        SplitOptionsBuilder::default()
    }
}

/// Split `text` into chapter-sized chunks.
///
/// Empty pieces are dropped, so whitespace-only input yields no chunks.
/// A single piece longer than `chunk_size` is hard-cut on character
/// boundaries.
///
/// # Examples
///
/// ```
/// use imgagent_core::{SplitOptions, split_text};
///
/// let options = SplitOptions::builder().chunk_size(13).chunk_overlap(0).build().unwrap();
/// let chunks = split_text("first\n\nsecond\n\nthird", &options);
/// assert_eq!(chunks, vec!["first\n\nsecond", "third"]);
/// ```
pub fn split_text(text: &str, options: &SplitOptions) -> Vec<String> {
    let chunk_size = options.chunk_size.max(1);
    let overlap = options.chunk_overlap.min(chunk_size.saturating_sub(1));
    let separator = if options.separator.is_empty() {
        "\n\n"
    } else {
        options.separator.as_str()
    };
    let sep_len = separator.chars().count();

    let mut pieces: Vec<String> = Vec::new();
    for raw in text.split(separator) {
        let piece = raw.trim();
        if piece.is_empty() {
            continue;
        }
        if piece.chars().count() <= chunk_size {
            pieces.push(piece.to_string());
        } else {
            pieces.extend(hard_cut(piece, chunk_size));
        }
    }

    let mut chunks = Vec::new();
    let mut current: Vec<&str> = Vec::new();
    let mut current_len = 0usize;

    for piece in &pieces {
        let piece_len = piece.chars().count();
        let joined_len = if current.is_empty() {
            piece_len
        } else {
            current_len + sep_len + piece_len
        };

        if joined_len > chunk_size && !current.is_empty() {
            chunks.push(current.join(separator));

            // Carry trailing pieces into the next chunk while they fit the overlap.
            let mut carried: Vec<&str> = Vec::new();
            let mut carried_len = 0usize;
            for prev in current.iter().rev() {
                let prev_len = prev.chars().count();
                let extra = if carried.is_empty() { prev_len } else { prev_len + sep_len };
                if carried_len + extra > overlap || carried_len + extra + sep_len + piece_len > chunk_size {
                    break;
                }
                carried.push(prev);
                carried_len += extra;
            }
            carried.reverse();
            current = carried;
            current_len = carried_len;
        }

        if current.is_empty() {
            current_len = piece_len;
        } else {
            current_len += sep_len + piece_len;
        }
        current.push(piece);
    }

    if !current.is_empty() {
        chunks.push(current.join(separator));
    }
    chunks
}

fn hard_cut(piece: &str, chunk_size: usize) -> Vec<String> {
    let chars: Vec<char> = piece.chars().collect();
    chars
        .chunks(chunk_size)
        .map(|c| c.iter().collect::<String>())
        .collect()
}
