//! Frame-count-preserving duplicate/drop remapping.
//!
//! The repeat defect injects duplicated frames and drops an equal number
//! of others, so the output has exactly as many frames as the input but
//! contains a temporal discontinuity.  The plan is the only defect whose
//! correctness is a quantitative invariant rather than a visual one:
//!
//!   - `|duplicates| == |drops|`
//!   - both sets are sorted, distinct, and disjoint
//!   - duplicates lie in `[1, N-2]`, drops in `[2, N-2]` — frame 0 and
//!     frame N-1 are never touched, keeping the sequence ends stable for
//!     downstream alignment
//!   - the emitted index program has length exactly `N`

use std::fmt::Write as _;

use rand::Rng;

/// Conservative sequence length assumed when the real frame count is
/// unknown (e.g. the size estimate failed).
pub const FALLBACK_FRAMES: u64 = 200;

/// A duplicate/drop position plan over an `n`-frame sequence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemapPlan {
    pub n: u64,
    pub duplicates: Vec<u64>,
    pub drops: Vec<u64>,
}

impl RemapPlan {
    /// Draw a plan from the shared random stream.
    ///
    /// `K = max(1, N/100)` duplicate positions are drawn uniformly from
    /// `[1, N-2]`; collisions collapse, which may reduce K.  Drop
    /// positions are then laid out deterministically: stride
    /// `max(N/(K+1), 2)` starting near `N/3`, clamped into `[2, N-2]`,
    /// backfilled from the tail when candidates collide with each other
    /// or with a duplicate.  In pathological small-N cases where not
    /// enough distinct drops exist both sets are truncated to the same
    /// cardinality, so the count invariant holds unconditionally.
    pub fn draw(total_frames: Option<u64>, rng: &mut impl Rng) -> Self {
        let n = total_frames.filter(|&n| n >= 4).unwrap_or(FALLBACK_FRAMES);
        let k = (n / 100).max(1);

        let mut duplicates: Vec<u64> =
            (0..k).map(|_| rng.random_range(1..=n - 2)).collect();
        duplicates.sort_unstable();
        duplicates.dedup();

        let drops = drop_positions(n, duplicates.len(), &duplicates);
        if drops.len() < duplicates.len() {
            duplicates.truncate(drops.len());
        }

        RemapPlan { n, duplicates, drops }
    }

    /// The ordered frame index program: walk `0..n`, skip dropped
    /// indices, and emit duplicated indices twice.  Because the two
    /// position sets are disjoint and equal in size, the result has
    /// length exactly `n`.
    pub fn emit_program(&self) -> Vec<u64> {
        let mut out = Vec::with_capacity(self.n as usize);
        for i in 0..self.n {
            if self.drops.binary_search(&i).is_ok() {
                continue;
            }
            out.push(i);
            if self.duplicates.binary_search(&i).is_ok() {
                out.push(i);
            }
        }
        out
    }

    /// Compress the index program into maximal consecutive runs
    /// `(first, last)`.  A duplicated frame ends one run and starts the
    /// next, so duplication shows up as two runs sharing a boundary
    /// index; a dropped frame shows up as a gap.
    pub fn segments(&self) -> Vec<(u64, u64)> {
        let mut runs = Vec::new();
        let mut program = self.emit_program().into_iter();
        let Some(first) = program.next() else {
            return runs;
        };
        let (mut a, mut b) = (first, first);
        for i in program {
            if i == b + 1 {
                b = i;
            } else {
                runs.push((a, b));
                a = i;
                b = i;
            }
        }
        runs.push((a, b));
        runs
    }
}

/// Lay out `k` drop positions for an `n`-frame plan, avoiding the given
/// (sorted) duplicate positions.  Fewer than `k` results are possible
/// only when the range `[2, n-2]` is nearly exhausted.
fn drop_positions(n: u64, k: usize, duplicates: &[u64]) -> Vec<u64> {
    let stride = (n / (k as u64 + 1)).max(2);
    let start = n / 3;
    let mut drops: Vec<u64> = Vec::with_capacity(k);

    for i in 0..k as u64 {
        let pos = (start + i * stride).clamp(2, n - 2);
        if !drops.contains(&pos) && duplicates.binary_search(&pos).is_err() {
            drops.push(pos);
        }
    }

    // Backfill from the tail until counts match or candidates run out.
    let mut tail = n - 2;
    while drops.len() < k && tail >= 2 {
        if !drops.contains(&tail) && duplicates.binary_search(&tail).is_err() {
            drops.push(tail);
        }
        if tail == 2 {
            break;
        }
        tail -= 1;
    }

    drops.truncate(k);
    drops.sort_unstable();
    drops
}

/// Serialize the plan as a split/select/concat filter graph.  Each run
/// becomes one branch that selects its frame range and restamps PTS from
/// zero; `concat` then splices the branches back together and `fps`
/// normalizes timing to the configured rate.
pub fn splice_graph(plan: &RemapPlan, fps: u32) -> String {
    let runs = plan.segments();
    let mut g = String::new();
    let _ = write!(g, "split={}", runs.len());
    for i in 0..runs.len() {
        let _ = write!(g, "[v{i}]");
    }
    g.push(';');
    for (i, (a, b)) in runs.iter().enumerate() {
        let _ = write!(
            g,
            "[v{i}]select='between(n\\,{a}\\,{b})',setpts=PTS-STARTPTS[s{i}];"
        );
    }
    for i in 0..runs.len() {
        let _ = write!(g, "[s{i}]");
    }
    let _ = write!(g, "concat=n={}:v=1:a=0,fps={}", runs.len(), fps);
    g
}
