use bilirank_core::CommentInput;

/// Size limits for one merged analysis request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchConfig {
    /// Character budget across content and video titles.
    pub max_chars: usize,
    pub max_items: usize,
    /// A batch below this size stays open even past the other limits.
    pub min_items: usize,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            max_chars: 3000,
            max_items: 15,
            min_items: 1,
        }
    }
}

fn input_len(input: &CommentInput) -> usize {
    input.content.chars().count() + input.video_title.chars().count()
}

/// Packs `inputs`, in order, into batches bounded by `config`.
///
/// A new batch starts when the next item would push the current one past
/// `max_chars` or `max_items`, unless the current batch holds fewer than
/// `min_items` (treated as at least 1). No batch is empty and concatenating
/// the batches yields `inputs` again.
#[must_use]
pub fn calculate_batches(inputs: &[CommentInput], config: &BatchConfig) -> Vec<Vec<CommentInput>> {
    let min_items = config.min_items.max(1);
    let mut batches = Vec::new();
    let mut current: Vec<CommentInput> = Vec::new();
    let mut chars = 0usize;

    for input in inputs {
        let len = input_len(input);
        let over_budget = chars + len > config.max_chars || current.len() >= config.max_items;
        if over_budget && current.len() >= min_items {
            batches.push(std::mem::take(&mut current));
            chars = 0;
        }
        chars += len;
        current.push(input.clone());
    }

    if !current.is_empty() {
        batches.push(current);
    }
    batches
}
