//! Boundary reconstruction: turning an unordered set of directed node-edges
//! into maximal ordered segments.
//!
//! The solver returns boundary edges in whatever order its mesher produced
//! them; adjacent edges of one physical boundary are frequently not adjacent
//! in the list. `reorder_boundary` repairs the ordering where a continuation
//! exists later in the list, and `edges_to_segments` folds the result into
//! node chains.

/// A directed edge between two node indices.
pub type NodeEdge = (usize, usize);

/// Returns the positions where the edge chain breaks: every index `i >= 1`
/// whose edge does not start where edge `i - 1` ended.
pub fn find_disjunctions(seg_list: &[NodeEdge]) -> Vec<usize> {
    let mut disjunctions = Vec::new();

    for i in 1..seg_list.len() {
        if seg_list[i].0 != seg_list[i - 1].1 {
            disjunctions.push(i);
        }
    }

    disjunctions
}

/// Mends the disjunction at position `n` by searching forward for the first
/// edge that continues edge `n - 1`, then re-splicing the list as
/// `[0..n] + [j..] + [n..j)`.
///
/// # Arguments
/// * `seg_list` - The edge list to mend in place
/// * `n` - Position of the disjunction
///
/// # Returns
/// Whether a continuation was found. When none exists the list is left
/// untouched; this happens legitimately when a label covers several
/// disconnected boundary arcs.
pub fn stitch_segment_list(seg_list: &mut Vec<NodeEdge>, n: usize) -> bool {
    let tail_end = seg_list[n - 1].1;

    let continuation = (n..seg_list.len()).find(|&j| seg_list[j].0 == tail_end);

    match continuation {
        Some(j) => {
            let skipped: Vec<NodeEdge> = seg_list.drain(n..j).collect();
            seg_list.extend(skipped);
            true
        }
        None => {
            println!(
                "warning [boundary]: no possible reconnection of segment list at position {}",
                n
            );
            false
        }
    }
}

/// Reorders a list of directed edges until no disjunction is left, or until
/// the remaining disjunctions cannot be mended.
///
/// Each successful stitch leaves the prefix before the break intact and makes
/// the break contiguous, so the first unresolved disjunction moves strictly
/// later in the list; the pass bound is therefore never reached on repairable
/// input. Unrepairable input is returned partially repaired after a warning.
/// No edge is invented or dropped, and every maximal chain in the result is
/// valid.
pub fn reorder_boundary(mut seg_list: Vec<NodeEdge>) -> Vec<NodeEdge> {
    let max_passes = seg_list.len() + 1;

    for pass in 0..=max_passes {
        if pass == max_passes {
            println!("warning [boundary]: boundary could not be fully repaired");
            break;
        }

        let mut mended = false;

        for n in find_disjunctions(&seg_list) {
            if stitch_segment_list(&mut seg_list, n) {
                mended = true;
                break;
            }
        }

        if !mended {
            break;
        }
    }

    seg_list
}

/// Folds a flat edge list into segments: a new segment starts wherever the
/// current edge does not continue the previous one.
pub fn edges_to_segments(edges: &[NodeEdge]) -> Vec<Vec<usize>> {
    let mut segments: Vec<Vec<usize>> = Vec::new();

    for &(start, end) in edges {
        let continues = segments
            .last()
            .map(|segment| *segment.last().unwrap() == start)
            .unwrap_or(false);

        if continues {
            segments.last_mut().unwrap().push(end);
        } else {
            segments.push(vec![start, end]);
        }
    }

    segments
}
