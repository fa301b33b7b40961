//! Per-frame similarity computation between reference and comparison
//! detections.

use nalgebra::DMatrix;

use crate::config::SimilarityMetric;
use crate::cost_matrix::CostMatrixData;
use crate::detection::FramePair;
use crate::Result;

/// Floor for union areas and Jaccard denominators.
pub(crate) const EPSILON: f64 = 1e-8;

/// Mean Earth radius in meters, for haversine distances.
const EARTH_RADIUS_M: f64 = 6_371_000.0;

/// Compute the similarity matrix for one frame and tag it with its origin.
///
/// The output has one row per reference detection and one column per
/// comparison detection; a side with zero detections yields a correctly
/// shaped zero-row or zero-column matrix.
pub fn frame_cost_matrix(
    pair: &FramePair,
    metric: SimilarityMetric,
    geo_max_distance_m: f64,
) -> Result<CostMatrixData> {
    let matrix = match metric {
        SimilarityMetric::Iou => iou_matrix(&pair.reference.boxes, &pair.comparison.boxes),
        SimilarityMetric::Geo => {
            geo_matrix(&pair.reference.geo, &pair.comparison.geo, geo_max_distance_m)
        }
    };
    Ok(CostMatrixData::new(
        pair.reference.ids.clone(),
        pair.comparison.ids.clone(),
        matrix,
        pair.video_id.clone(),
        pair.frame,
    ))
}

/// Pairwise IoU between two sets of (x, y, w, h) boxes.
///
/// The union is floored at a small epsilon so degenerate zero-area pairs
/// divide cleanly to zero.
pub fn iou_matrix(boxes_a: &DMatrix<f64>, boxes_b: &DMatrix<f64>) -> DMatrix<f64> {
    let n = boxes_a.nrows();
    let m = boxes_b.nrows();
    if n == 0 || m == 0 {
        return DMatrix::zeros(n, m);
    }

    // xywh -> min/max corners, areas precomputed per side
    let mut a = DMatrix::zeros(n, 4);
    let mut a_area = vec![0.0; n];
    for i in 0..n {
        a[(i, 0)] = boxes_a[(i, 0)];
        a[(i, 1)] = boxes_a[(i, 1)];
        a[(i, 2)] = boxes_a[(i, 0)] + boxes_a[(i, 2)];
        a[(i, 3)] = boxes_a[(i, 1)] + boxes_a[(i, 3)];
        a_area[i] = boxes_a[(i, 2)] * boxes_a[(i, 3)];
    }
    let mut b = DMatrix::zeros(m, 4);
    let mut b_area = vec![0.0; m];
    for j in 0..m {
        b[(j, 0)] = boxes_b[(j, 0)];
        b[(j, 1)] = boxes_b[(j, 1)];
        b[(j, 2)] = boxes_b[(j, 0)] + boxes_b[(j, 2)];
        b[(j, 3)] = boxes_b[(j, 1)] + boxes_b[(j, 3)];
        b_area[j] = boxes_b[(j, 2)] * boxes_b[(j, 3)];
    }

    let mut result = DMatrix::zeros(n, m);
    for i in 0..n {
        for j in 0..m {
            let left = a[(i, 0)].max(b[(j, 0)]);
            let top = a[(i, 1)].max(b[(j, 1)]);
            let right = a[(i, 2)].min(b[(j, 2)]);
            let bottom = a[(i, 3)].min(b[(j, 3)]);

            let width = (right - left).max(0.0);
            let height = (bottom - top).max(0.0);
            let intersection = width * height;

            let union = a_area[i] + b_area[j] - intersection;
            result[(i, j)] = intersection / union.max(EPSILON);
        }
    }
    result
}

/// Pairwise geo similarity between two sets of (lat, lon, alt) rows.
///
/// Haversine distance over (lat, lon), mapped linearly to [0, 1] so that
/// zero distance scores 1 and anything at or beyond `max_distance_m`
/// scores 0. Altitude is carried in the data but not part of the
/// distance. NaN coordinates propagate to NaN similarity, which the
/// accumulation stage treats as fatal.
pub fn geo_matrix(geo_a: &DMatrix<f64>, geo_b: &DMatrix<f64>, max_distance_m: f64) -> DMatrix<f64> {
    let n = geo_a.nrows();
    let m = geo_b.nrows();
    if n == 0 || m == 0 {
        return DMatrix::zeros(n, m);
    }

    let mut result = DMatrix::zeros(n, m);
    for i in 0..n {
        for j in 0..m {
            let d = haversine_m(
                geo_a[(i, 0)],
                geo_a[(i, 1)],
                geo_b[(j, 0)],
                geo_b[(j, 1)],
            );
            result[(i, j)] = if d.is_nan() {
                f64::NAN
            } else {
                (1.0 - d / max_distance_m).clamp(0.0, 1.0)
            };
        }
    }
    result
}

/// Great-circle distance in meters between two (lat, lon) points in degrees.
fn haversine_m(lat_a: f64, lon_a: f64, lat_b: f64, lon_b: f64) -> f64 {
    let phi_a = lat_a.to_radians();
    let phi_b = lat_b.to_radians();
    let d_phi = (lat_b - lat_a).to_radians();
    let d_lambda = (lon_b - lon_a).to_radians();

    let h = (d_phi / 2.0).sin().powi(2) + phi_a.cos() * phi_b.cos() * (d_lambda / 2.0).sin().powi(2);
    2.0 * EARTH_RADIUS_M * h.sqrt().asin()
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_iou_identical_boxes() {
        let boxes = DMatrix::from_row_slice(1, 4, &[0.0, 0.0, 10.0, 10.0]);
        let result = iou_matrix(&boxes, &boxes);
        assert_relative_eq!(result[(0, 0)], 1.0, epsilon = 1e-10);
    }

    #[test]
    fn test_iou_disjoint_boxes() {
        let a = DMatrix::from_row_slice(1, 4, &[0.0, 0.0, 10.0, 10.0]);
        let b = DMatrix::from_row_slice(1, 4, &[20.0, 20.0, 10.0, 10.0]);
        let result = iou_matrix(&a, &b);
        assert_relative_eq!(result[(0, 0)], 0.0, epsilon = 1e-10);
    }

    #[test]
    fn test_iou_partial_overlap() {
        let a = DMatrix::from_row_slice(1, 4, &[0.0, 0.0, 10.0, 10.0]);
        let b = DMatrix::from_row_slice(1, 4, &[5.0, 5.0, 10.0, 10.0]);
        let result = iou_matrix(&a, &b);
        // intersection 5x5 = 25, union 100 + 100 - 25 = 175
        assert_relative_eq!(result[(0, 0)], 25.0 / 175.0, epsilon = 1e-10);
    }

    #[test]
    fn test_iou_symmetric() {
        let a = DMatrix::from_row_slice(2, 4, &[0.0, 0.0, 10.0, 10.0, 3.0, 2.0, 8.0, 6.0]);
        let b = DMatrix::from_row_slice(1, 4, &[5.0, 5.0, 10.0, 10.0]);
        let ab = iou_matrix(&a, &b);
        let ba = iou_matrix(&b, &a);
        for i in 0..2 {
            assert_relative_eq!(ab[(i, 0)], ba[(0, i)], epsilon = 1e-12);
        }
    }

    #[test]
    fn test_iou_zero_area_boxes() {
        let a = DMatrix::from_row_slice(1, 4, &[5.0, 5.0, 0.0, 0.0]);
        let result = iou_matrix(&a, &a);
        // union floored at epsilon, no division by zero
        assert_relative_eq!(result[(0, 0)], 0.0, epsilon = 1e-10);
    }

    #[test]
    fn test_iou_empty_side_shapes() {
        let a = DMatrix::zeros(0, 4);
        let b = DMatrix::from_row_slice(2, 4, &[0.0, 0.0, 1.0, 1.0, 1.0, 1.0, 2.0, 2.0]);
        let result = iou_matrix(&a, &b);
        assert_eq!(result.nrows(), 0);
        assert_eq!(result.ncols(), 2);
    }

    #[test]
    fn test_geo_zero_distance_is_one() {
        let g = DMatrix::from_row_slice(1, 3, &[45.0, -75.0, 100.0]);
        let result = geo_matrix(&g, &g, 50.0);
        assert_relative_eq!(result[(0, 0)], 1.0, epsilon = 1e-10);
    }

    #[test]
    fn test_geo_beyond_max_distance_is_zero() {
        let a = DMatrix::from_row_slice(1, 3, &[45.0, -75.0, 0.0]);
        // ~1 degree of latitude is ~111 km, far beyond 50 m
        let b = DMatrix::from_row_slice(1, 3, &[46.0, -75.0, 0.0]);
        let result = geo_matrix(&a, &b, 50.0);
        assert_relative_eq!(result[(0, 0)], 0.0, epsilon = 1e-10);
    }

    #[test]
    fn test_geo_symmetric() {
        let a = DMatrix::from_row_slice(1, 3, &[45.0, -75.0, 0.0]);
        let b = DMatrix::from_row_slice(1, 3, &[45.0001, -75.0001, 0.0]);
        let ab = geo_matrix(&a, &b, 50.0);
        let ba = geo_matrix(&b, &a, 50.0);
        assert_relative_eq!(ab[(0, 0)], ba[(0, 0)], epsilon = 1e-12);
        assert!(ab[(0, 0)] > 0.0 && ab[(0, 0)] < 1.0);
    }

    #[test]
    fn test_geo_nan_coordinates_propagate() {
        let a = DMatrix::from_element(1, 3, f64::NAN);
        let b = DMatrix::from_row_slice(1, 3, &[45.0, -75.0, 0.0]);
        let result = geo_matrix(&a, &b, 50.0);
        assert!(result[(0, 0)].is_nan());
    }

    #[test]
    fn test_haversine_known_distance() {
        // One degree of longitude at the equator is about 111.19 km.
        let d = haversine_m(0.0, 0.0, 0.0, 1.0);
        assert_relative_eq!(d, 111_195.0, epsilon = 100.0);
    }
}
