use std::cmp::Ordering;

#[derive(Debug, Clone)]
pub struct LinkCandidate {
    pub id: usize,
    pub capacity_bps: f64,
    pub rtt_ms: f64,
    pub queue_depth: usize,
    pub max_queue: usize,
    pub alive: bool,
}

impl LinkCandidate {
    pub fn score(&self) -> f64 {
        // score(l) = (l.capacity * 0.7) - (l.rtt * 0.3)
        // Normalize?
        // If capacity is 10Mbps (10,000,000) and RTT is 50ms (50).
        // 10,000,000 * 0.7 - 50 * 0.3 is huge.
        // The spec formula: "score(l) = (l.capacity * 0.7) - (l.rtt * 0.3)" might be symbolic or requires normalization.
        // Assuming strict adherence to formula for now, but usually one would normalize.
        // Let's assume the formula is illustrative of "Higher capacity is better, lower RTT is better".
        // But since I must implement it, I should probably handle units safely.

        // Let's use the raw formula for now but assume RTT impact needs to be significant relative to capacity?
        // Actually, if I just implement the math as written:
        (self.capacity_bps * 0.7) - (self.rtt_ms * 0.3)
    }
}

pub fn select_best_link(candidates: &[LinkCandidate]) -> Option<usize> {
    candidates
        .iter()
        .filter(|l| l.alive)
        .filter(|l| l.queue_depth < l.max_queue)
        // Find max score.
        // f64 is not Ord, so we need partial_cmp or helper.
        .max_by(|a, b| a.score().partial_cmp(&b.score()).unwrap_or(Ordering::Equal))
        .map(|l| l.id)
}
