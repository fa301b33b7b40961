//! Maximum-weight one-to-one assignment on similarity matrices.
//!
//! Hungarian (Kuhn-Munkres) solver over a dense similarity matrix.
//! Rectangular inputs are padded to square internally; pairs involving
//! padding are dropped, so unmatched rows or columns are simply absent
//! from the result.

use nalgebra::DMatrix;

const ZERO_TOL: f64 = 1e-10;

/// Solve for the set of (row, col) pairs maximizing total similarity.
///
/// Every row and column appears in at most one pair. Non-finite
/// similarities are treated as zero affinity. The number of pairs equals
/// `min(nrows, ncols)` for finite inputs.
pub fn max_weight_assignment(similarity: &DMatrix<f64>) -> Vec<(usize, usize)> {
    let n_rows = similarity.nrows();
    let n_cols = similarity.ncols();
    if n_rows == 0 || n_cols == 0 {
        return Vec::new();
    }

    let mut max_sim = 0.0f64;
    for &v in similarity.iter() {
        if v.is_finite() && v > max_sim {
            max_sim = v;
        }
    }

    // Maximization becomes minimization of (max_sim - value); padded cells
    // cost zero, which the perfect matching fills only after every real
    // column (or row) is taken.
    let n = n_rows.max(n_cols);
    let mut cost = vec![vec![0.0f64; n]; n];
    for i in 0..n_rows {
        for j in 0..n_cols {
            let v = similarity[(i, j)];
            cost[i][j] = if v.is_finite() { max_sim - v } else { max_sim };
        }
    }

    let row_match = minimize_square(&mut cost);

    let mut pairs = Vec::new();
    for (row, col) in row_match.into_iter().enumerate() {
        if let Some(col) = col {
            if row < n_rows && col < n_cols {
                pairs.push((row, col));
            }
        }
    }
    pairs
}

/// Minimum-cost perfect matching on a square cost matrix.
///
/// Returns `result[i] = Some(j)` when row `i` is matched to column `j`.
fn minimize_square(cost: &mut [Vec<f64>]) -> Vec<Option<usize>> {
    let n = cost.len();

    // Row then column reduction to seed zeros.
    for row in cost.iter_mut() {
        let min = row.iter().copied().fold(f64::INFINITY, f64::min);
        if min.is_finite() {
            for v in row.iter_mut() {
                *v -= min;
            }
        }
    }
    for j in 0..n {
        let min = (0..n).map(|i| cost[i][j]).fold(f64::INFINITY, f64::min);
        if min.is_finite() {
            for row in cost.iter_mut() {
                row[j] -= min;
            }
        }
    }

    let mut row_match: Vec<Option<usize>> = vec![None; n];
    let mut col_match: Vec<Option<usize>> = vec![None; n];

    // Greedy seed on zeros.
    for i in 0..n {
        for j in 0..n {
            if cost[i][j] < ZERO_TOL && row_match[i].is_none() && col_match[j].is_none() {
                row_match[i] = Some(j);
                col_match[j] = Some(i);
            }
        }
    }

    loop {
        let free_rows: Vec<usize> = (0..n).filter(|&i| row_match[i].is_none()).collect();
        if free_rows.is_empty() {
            break;
        }

        let mut augmented = false;
        for &start in &free_rows {
            if augment(cost, start, &mut row_match, &mut col_match) {
                augmented = true;
                break;
            }
        }
        if augmented {
            continue;
        }

        // No augmenting path through zeros; shift duals to expose new ones.
        let (row_covered, col_covered) = alternating_cover(cost, &free_rows, &col_match);
        let mut delta = f64::INFINITY;
        for i in 0..n {
            if !row_covered[i] {
                continue;
            }
            for j in 0..n {
                if !col_covered[j] {
                    delta = delta.min(cost[i][j]);
                }
            }
        }
        if !delta.is_finite() || delta <= 0.0 {
            // Degenerate ties; leave remaining rows unmatched.
            break;
        }
        for i in 0..n {
            for j in 0..n {
                if row_covered[i] && !col_covered[j] {
                    cost[i][j] -= delta;
                } else if !row_covered[i] && col_covered[j] {
                    cost[i][j] += delta;
                }
            }
        }
    }

    row_match
}

/// BFS for an augmenting path of zeros starting at a free row; flips the
/// path into the matching when found.
fn augment(
    cost: &[Vec<f64>],
    start: usize,
    row_match: &mut [Option<usize>],
    col_match: &mut [Option<usize>],
) -> bool {
    let n = cost.len();
    let mut parent_col: Vec<Option<usize>> = vec![None; n];
    let mut visited_col = vec![false; n];
    let mut queue = std::collections::VecDeque::from([start]);
    let mut end_col: Option<usize> = None;

    'bfs: while let Some(row) = queue.pop_front() {
        for col in 0..n {
            if visited_col[col] || cost[row][col] >= ZERO_TOL {
                continue;
            }
            visited_col[col] = true;
            parent_col[col] = Some(row);
            match col_match[col] {
                None => {
                    end_col = Some(col);
                    break 'bfs;
                }
                Some(next_row) => queue.push_back(next_row),
            }
        }
    }

    let Some(mut col) = end_col else {
        return false;
    };
    while let Some(row) = parent_col[col] {
        let prev = row_match[row];
        row_match[row] = Some(col);
        col_match[col] = Some(row);
        match prev {
            Some(prev_col) => col = prev_col,
            None => return true,
        }
    }
    false
}

/// Rows/columns reachable from the free rows through alternating zero paths.
fn alternating_cover(
    cost: &[Vec<f64>],
    free_rows: &[usize],
    col_match: &[Option<usize>],
) -> (Vec<bool>, Vec<bool>) {
    let n = cost.len();
    let mut row_covered = vec![false; n];
    let mut col_covered = vec![false; n];
    let mut stack: Vec<usize> = free_rows.to_vec();

    while let Some(row) = stack.pop() {
        if row_covered[row] {
            continue;
        }
        row_covered[row] = true;
        for col in 0..n {
            if cost[row][col] < ZERO_TOL && !col_covered[col] {
                col_covered[col] = true;
                if let Some(matched_row) = col_match[col] {
                    stack.push(matched_row);
                }
            }
        }
    }
    (row_covered, col_covered)
}
