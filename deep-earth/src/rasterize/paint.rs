//! Burning geometries into integer-indexed rasters.
//!
//! Coordinates are continuous pixel positions `(col, row)`: pixel `(c, r)`
//! covers `[c, c + 1) x [r, r + 1)`.

use ndarray::Array2;

/// Fills every cell whose center lies inside the rings (even-odd rule).
pub fn fill_polygon<T: Clone>(target: &mut Array2<T>, rings: &[Vec<(f64, f64)>], value: T) {
    let (height, width) = target.dim();
    let ys = rings.iter().flatten().map(|&(_, y)| y);
    let (min_y, max_y) = ys.fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), y| {
        (lo.min(y), hi.max(y))
    });
    if !min_y.is_finite() || !max_y.is_finite() {
        return;
    }

    let row_start = (min_y - 0.5).ceil().max(0.0) as usize;
    let row_end = ((max_y - 0.5).floor() + 1.0).clamp(0.0, height as f64) as usize;

    let mut crossings = Vec::new();
    for row in row_start..row_end {
        let yc = row as f64 + 0.5;
        crossings.clear();

        for ring in rings {
            let n = ring.len();
            for i in 0..n {
                let (x0, y0) = ring[i];
                let (x1, y1) = ring[(i + 1) % n];
                if (y0 <= yc) != (y1 <= yc) {
                    crossings.push(x0 + (yc - y0) * (x1 - x0) / (y1 - y0));
                }
            }
        }
        crossings.sort_by(|a, b| a.total_cmp(b));

        for span in crossings.chunks_exact(2) {
            let col_start = (span[0] - 0.5).ceil().max(0.0);
            let col_end = (span[1] - 0.5).ceil().min(width as f64);
            if col_end <= col_start {
                continue;
            }
            for col in col_start as usize..col_end as usize {
                target[(row, col)] = value.clone();
            }
        }
    }
}

/// Marks every cell a polyline passes through.
pub fn draw_line<T: Clone>(target: &mut Array2<T>, points: &[(f64, f64)], value: T) {
    let (height, width) = target.dim();

    if let [(x, y)] = points {
        set_cell(target, *x, *y, &value);
        return;
    }

    for segment in points.windows(2) {
        let Some(((x0, y0), (x1, y1))) = clip_segment(segment[0], segment[1], width, height)
        else {
            continue;
        };

        // Half-pixel steps so no traversed cell is skipped
        let span = (x1 - x0).abs().max((y1 - y0).abs());
        let steps = (span * 2.0).ceil().max(1.0) as usize;
        for i in 0..=steps {
            let t = i as f64 / steps as f64;
            set_cell(target, x0 + t * (x1 - x0), y0 + t * (y1 - y0), &value);
        }
    }
}

fn set_cell<T: Clone>(target: &mut Array2<T>, x: f64, y: f64, value: &T) {
    let (height, width) = target.dim();
    if x < 0.0 || y < 0.0 {
        return;
    }
    let (col, row) = (x.floor() as usize, y.floor() as usize);
    if col < width && row < height {
        target[(row, col)] = value.clone();
    }
}

/// Liang-Barsky clip of a segment to the grid, padded by one pixel.
fn clip_segment(
    p0: (f64, f64),
    p1: (f64, f64),
    width: usize,
    height: usize,
) -> Option<((f64, f64), (f64, f64))> {
    let (xmin, ymin) = (-1.0, -1.0);
    let (xmax, ymax) = (width as f64 + 1.0, height as f64 + 1.0);
    let (dx, dy) = (p1.0 - p0.0, p1.1 - p0.1);

    let mut t0: f64 = 0.0;
    let mut t1: f64 = 1.0;
    for (p, q) in [
        (-dx, p0.0 - xmin),
        (dx, xmax - p0.0),
        (-dy, p0.1 - ymin),
        (dy, ymax - p0.1),
    ] {
        if p == 0.0 {
            if q < 0.0 {
                return None;
            }
        } else {
            let r = q / p;
            if p < 0.0 {
                t0 = t0.max(r);
            } else {
                t1 = t1.min(r);
            }
        }
    }
    if t0 > t1 {
        return None;
    }

    Some((
        (p0.0 + t0 * dx, p0.1 + t0 * dy),
        (p0.0 + t1 * dx, p0.1 + t1 * dy),
    ))
}
