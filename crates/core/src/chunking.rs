use crate::error::IngestError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkingConfig {
    pub max_chars: usize,
    pub overlap_chars: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            max_chars: 3_000,
            overlap_chars: 300,
        }
    }
}

impl ChunkingConfig {
    pub fn validate(&self) -> Result<(), IngestError> {
        if self.max_chars == 0 {
            return Err(IngestError::InvalidChunkConfig(
                "max_chars must be greater than zero".to_string(),
            ));
        }
        if self.overlap_chars >= self.max_chars {
            return Err(IngestError::InvalidChunkConfig(format!(
                "overlap_chars ({}) must be smaller than max_chars ({})",
                self.overlap_chars, self.max_chars
            )));
        }
        Ok(())
    }
}

pub fn normalize_whitespace(text: &str) -> String {
    text.replace('\u{a0}', " ")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Splits `text` into windows of at most `max_chars` characters where each
/// window starts exactly `overlap_chars` characters before the previous one
/// ended. Window ends are pulled back to a paragraph break, then to any
/// whitespace, when one exists past the overlap region.
pub fn chunk_text(text: &str, config: ChunkingConfig) -> Result<Vec<String>, IngestError> {
    config.validate()?;
    if text.trim().is_empty() {
        return Err(IngestError::EmptyText);
    }

    let chars: Vec<char> = text.chars().collect();
    if chars.len() <= config.max_chars {
        return Ok(vec![text.to_string()]);
    }

    let mut chunks = Vec::new();
    let mut start = 0;
    loop {
        let hard_end = (start + config.max_chars).min(chars.len());
        if hard_end == chars.len() {
            chunks.push(chars[start..].iter().collect());
            break;
        }

        // end must stay past start + overlap so the next window advances
        let floor = start + config.overlap_chars + 1;
        let end = boundary_before(&chars, floor, hard_end).unwrap_or(hard_end);

        chunks.push(chars[start..end].iter().collect());
        start = end - config.overlap_chars;
    }

    Ok(chunks)
}

fn boundary_before(chars: &[char], floor: usize, end: usize) -> Option<usize> {
    if floor >= end {
        return None;
    }

    let window = &chars[floor..end];
    if let Some(position) = window
        .windows(2)
        .rposition(|pair| pair[0] == '\n' && pair[1] == '\n')
    {
        return Some(floor + position + 2);
    }

    window
        .iter()
        .rposition(|character| character.is_whitespace())
        .map(|position| floor + position + 1)
}
