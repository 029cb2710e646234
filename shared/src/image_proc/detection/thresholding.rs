//! Connected component labelling on binary masks.
//!
//! Two-pass labelling with union-find equivalence resolution. Uses
//! 4-connectivity: only horizontal and vertical neighbours join a component,
//! diagonal contact does not.

use crate::image_proc::detection::AABB;
use ndarray::{Array2, ArrayView2};

/// Find the root label in a disjoint-set (union-find) data structure
fn find_root(labels: &mut [usize], label: usize) -> usize {
    let mut current = label;

    while current != labels[current] {
        // Path halving
        labels[current] = labels[labels[current]];
        current = labels[current];
    }

    current
}

/// Union two labels, keeping the smaller label as the canonical root
fn union_labels(labels: &mut [usize], label1: usize, label2: usize) -> usize {
    let root1 = find_root(labels, label1);
    let root2 = find_root(labels, label2);

    if root1 == root2 {
        return root1;
    }
    if root1 < root2 {
        labels[root2] = root1;
        root1
    } else {
        labels[root1] = root2;
        root2
    }
}

/// Label the connected foreground regions of a mask.
///
/// # Returns
/// Labelled image where background is 0 and each component carries a unique
/// consecutive label starting at 1.
pub fn connected_components(mask: &ArrayView2<bool>) -> Array2<usize> {
    let (height, width) = mask.dim();
    let mut labels = Array2::zeros((height, width));
    let mut label_count = 0;

    // Label 0 is background, its slot is never used as a root
    let mut parent_table = vec![0];

    for i in 0..height {
        for j in 0..width {
            if !mask[[i, j]] {
                continue;
            }

            let up = if i > 0 { labels[[i - 1, j]] } else { 0 };
            let left = if j > 0 { labels[[i, j - 1]] } else { 0 };

            labels[[i, j]] = match (up, left) {
                (0, 0) => {
                    label_count += 1;
                    parent_table.push(label_count);
                    label_count
                }
                (n, 0) | (0, n) => n,
                (a, b) => {
                    let min_label = a.min(b);
                    if a != b {
                        union_labels(&mut parent_table, a, b);
                    }
                    min_label
                }
            };
        }
    }

    for i in 1..parent_table.len() {
        find_root(&mut parent_table, i);
    }

    // Map roots to consecutive labels
    let mut relabel_map = vec![0; parent_table.len()];
    let mut next_label = 1;
    for i in 1..parent_table.len() {
        let root = find_root(&mut parent_table, i);
        if relabel_map[root] == 0 {
            relabel_map[root] = next_label;
            next_label += 1;
        }
        relabel_map[i] = relabel_map[root];
    }

    labels.mapv_inplace(|label| relabel_map[label]);
    labels
}

/// Extract the bounding box of every labelled component.
///
/// Index `i` of the result corresponds to label `i + 1`.
pub fn get_bounding_boxes(labeled_image: &ArrayView2<usize>) -> Vec<AABB> {
    let max_label = labeled_image.iter().copied().max().unwrap_or(0);
    let mut bboxes = vec![AABB::new(); max_label + 1];

    for ((row, col), &label) in labeled_image.indexed_iter() {
        if label > 0 {
            bboxes[label].expand_to_include(row, col);
        }
    }

    bboxes.remove(0);
    bboxes
}
