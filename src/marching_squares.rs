//! Isocline extraction (C7): marching squares over a rectangular lattice of
//! a scalar field, with linear edge interpolation (Open Question resolved in
//! DESIGN.md in favour of linear interpolation over edge-midpoint
//! placement) and segment chaining into maximal polylines via an
//! arena-indexed reversible doubly-linked list, avoiding the cyclic
//! ownership a `Rc<RefCell<_>>` graph would need.
//!
//! [`extract_isocline`] is the 2-D primitive (spec.md §6's `march_squares` +
//! `conjoin_segments` fused, since nothing outside this module needs the
//! unchained raw segments). [`march_squares_model`] is the model-level entry
//! point: it evaluates an arbitrary compiled expression `g(x; p)` over the
//! state vector, holding every axis outside the scanned 2 or 3 fixed at
//! `base_state`, and — when a third axis is given — slices the lattice along
//! it, one isocline per slice (spec.md §4.7: "optionally for each slice along
//! x₃").

use nalgebra::DVector;

use crate::error::{KernelError, KernelResult};
use crate::expr::CompiledExpr;
use crate::model::{IsoPoint, Isocline, Model, Parameters};

#[derive(Debug, Clone, Copy, PartialEq)]
struct Point2 {
    x: f64,
    y: f64,
}

#[derive(Debug, Clone, Copy)]
struct Segment {
    a: Point2,
    b: Point2,
}

/// A single linearly-interpolated crossing segment, in the public
/// coordinate representation (spec.md §6 lists `march_squares` and
/// `conjoin_segments` as two separate operations; [`conjoin_segments`] is
/// the public entry point for the latter, taking the raw segment multiset
/// [`extract_isocline`] produces internally and chaining it itself).
#[derive(Debug, Clone, Copy)]
pub struct IsoSegment {
    pub a: [f64; 2],
    pub b: [f64; 2],
}

/// Chain an unordered multiset of edge-crossing segments into maximal
/// polylines (spec.md §6 `conjoin_segments`, §4.7's chaining step exposed
/// standalone). Joins endpoints coincident within `1e-10` on both
/// coordinates; every input segment appears in exactly one output polyline.
pub fn conjoin_segments(segments: Vec<IsoSegment>) -> Vec<Vec<[f64; 2]>> {
    let internal: Vec<Segment> = segments
        .into_iter()
        .map(|s| Segment {
            a: Point2 { x: s.a[0], y: s.a[1] },
            b: Point2 { x: s.b[0], y: s.b[1] },
        })
        .collect();
    chain_segments(internal)
        .into_iter()
        .map(|poly| poly.into_iter().map(|p| [p.x, p.y]).collect())
        .collect()
}

const JUNCTION_TOL: f64 = 1e-10;

/// Settings for a rectangular sampling lattice over `[x_min, x_max] x
/// [y_min, y_max]`.
#[derive(Debug, Clone, Copy)]
pub struct LatticeSettings {
    pub x_min: f64,
    pub x_max: f64,
    pub y_min: f64,
    pub y_max: f64,
    pub nx: usize,
    pub ny: usize,
}

/// Extract the `level`-isocline of `field(x, y)` as a set of maximal
/// polylines, each point carrying `(x1, level, x3)` to match the
/// three-coordinate [`IsoPoint`] convention used elsewhere (spec.md §4.7).
pub fn extract_isocline<F>(
    mut field: F,
    level: f64,
    settings: LatticeSettings,
) -> KernelResult<Vec<Vec<IsoPoint>>>
where
    F: FnMut(f64, f64) -> f64,
{
    if settings.nx < 2 || settings.ny < 2 {
        return Err(KernelError::ResolutionTooSmall(settings.nx.min(settings.ny)));
    }
    let nx = settings.nx;
    let ny = settings.ny;
    let dx = (settings.x_max - settings.x_min) / (nx - 1) as f64;
    let dy = (settings.y_max - settings.y_min) / (ny - 1) as f64;

    let mut grid = vec![vec![0.0f64; nx]; ny];
    for (j, row) in grid.iter_mut().enumerate() {
        for (i, cell) in row.iter_mut().enumerate() {
            let x = settings.x_min + i as f64 * dx;
            let y = settings.y_min + j as f64 * dy;
            let v = field(x, y);
            if !v.is_finite() {
                return Err(KernelError::Diverged);
            }
            *cell = v;
        }
    }

    let mut segments = Vec::new();
    for j in 0..ny - 1 {
        for i in 0..nx - 1 {
            let x0 = settings.x_min + i as f64 * dx;
            let y0 = settings.y_min + j as f64 * dy;
            let corners = [
                grid[j][i] - level,
                grid[j][i + 1] - level,
                grid[j + 1][i + 1] - level,
                grid[j + 1][i] - level,
            ];
            cell_segments(x0, y0, dx, dy, corners, &mut segments);
        }
    }

    let chained = chain_segments(segments);
    Ok(chained
        .into_iter()
        .map(|poly| poly.into_iter().map(|p| [p.x, level, p.y]).collect())
        .collect())
}

/// One scanned axis: `[min, max]` range sampled at `resolution` points
/// (spec.md §4.7: "per-axis [min,max] range, per-axis integer resolution ≥
/// 2"). `variable` is the index into the model's state vector that this
/// axis scans.
#[derive(Debug, Clone, Copy)]
pub struct LatticeAxis {
    pub variable: usize,
    pub min: f64,
    pub max: f64,
    pub resolution: usize,
}

/// Model-level marching squares (spec.md §6 `march_squares`): evaluate
/// `expr` over the state vector as the two (or three) listed `axes` vary
/// across a lattice, holding every other state component at `base_state`.
/// With two axes this returns a single isocline; with three, one isocline
/// per slice along the third axis, scanned outermost as spec.md §4.7
/// prescribes ("k for axis 3 if present, j for axis 2, i for axis 1").
pub fn march_squares_model(
    model: &Model,
    params: &Parameters,
    expr: &CompiledExpr,
    level: f64,
    base_state: &DVector<f64>,
    axes: &[LatticeAxis],
) -> KernelResult<Vec<Isocline>> {
    if axes.len() != 2 && axes.len() != 3 {
        return Err(KernelError::DimensionMismatch { expected: 2, got: axes.len() });
    }
    if base_state.len() != model.dim() {
        return Err(KernelError::DimensionMismatch { expected: model.dim(), got: base_state.len() });
    }
    for axis in axes {
        if axis.variable >= model.dim() {
            return Err(KernelError::DimensionMismatch { expected: model.dim(), got: axis.variable + 1 });
        }
    }

    let eval = |x: &DVector<f64>| -> KernelResult<f64> { Ok(expr.eval_state(x, params)?) };

    let xy_settings = |axes: &[LatticeAxis]| LatticeSettings {
        x_min: axes[0].min,
        x_max: axes[0].max,
        y_min: axes[1].min,
        y_max: axes[1].max,
        nx: axes[0].resolution,
        ny: axes[1].resolution,
    };

    if axes.len() == 2 {
        let mut x = base_state.clone();
        let settings = xy_settings(axes);
        let polylines = extract_isocline(
            |a, b| {
                x[axes[0].variable] = a;
                x[axes[1].variable] = b;
                eval(&x).unwrap_or(f64::NAN)
            },
            level,
            settings,
        )?;
        return Ok(vec![Isocline { polylines }]);
    }

    let axis3 = axes[2];
    if axis3.resolution < 2 {
        return Err(KernelError::ResolutionTooSmall(axis3.resolution));
    }
    let dz = (axis3.max - axis3.min) / (axis3.resolution - 1) as f64;
    let settings = xy_settings(axes);
    let mut slices = Vec::with_capacity(axis3.resolution);
    for k in 0..axis3.resolution {
        let z = axis3.min + k as f64 * dz;
        let mut x = base_state.clone();
        x[axis3.variable] = z;
        let polylines = extract_isocline(
            |a, b| {
                x[axes[0].variable] = a;
                x[axes[1].variable] = b;
                eval(&x).unwrap_or(f64::NAN)
            },
            level,
            settings,
        )?;
        slices.push(Isocline { polylines });
    }
    Ok(slices)
}

fn lerp_edge(v_a: f64, v_b: f64, p_a: Point2, p_b: Point2) -> Point2 {
    let t = v_a / (v_a - v_b);
    Point2 { x: p_a.x + t * (p_b.x - p_a.x), y: p_a.y + t * (p_b.y - p_a.y) }
}

/// Emit the 0, 1, or 2 segments for one grid cell given the four corner
/// values (relative to the level, so the zero-crossing is where the sign
/// changes). Corner order: bottom-left, bottom-right, top-right, top-left.
/// Cases 5 and 10 (diagonal saddle ambiguity) emit two segments, matching
/// the "two disjoint segments" convention rather than resolving via
/// center-sampling (spec.md §4.7 edge case table).
fn cell_segments(
    x0: f64,
    y0: f64,
    dx: f64,
    dy: f64,
    corners: [f64; 4],
    out: &mut Vec<Segment>,
) {
    let bl = Point2 { x: x0, y: y0 };
    let br = Point2 { x: x0 + dx, y: y0 };
    let tr = Point2 { x: x0 + dx, y: y0 + dy };
    let tl = Point2 { x: x0, y: y0 + dy };

    let code = (corners[0] > 0.0) as u8
        | ((corners[1] > 0.0) as u8) << 1
        | ((corners[2] > 0.0) as u8) << 2
        | ((corners[3] > 0.0) as u8) << 3;

    let e_bottom = || lerp_edge(corners[0], corners[1], bl, br);
    let e_right = || lerp_edge(corners[1], corners[2], br, tr);
    let e_top = || lerp_edge(corners[3], corners[2], tl, tr);
    let e_left = || lerp_edge(corners[0], corners[3], bl, tl);

    match code {
        0 | 15 => {}
        1 | 14 => out.push(Segment { a: e_left(), b: e_bottom() }),
        2 | 13 => out.push(Segment { a: e_bottom(), b: e_right() }),
        3 | 12 => out.push(Segment { a: e_left(), b: e_right() }),
        4 | 11 => out.push(Segment { a: e_right(), b: e_top() }),
        6 | 9 => out.push(Segment { a: e_bottom(), b: e_top() }),
        7 | 8 => out.push(Segment { a: e_left(), b: e_top() }),
        5 => {
            out.push(Segment { a: e_left(), b: e_bottom() });
            out.push(Segment { a: e_right(), b: e_top() });
        }
        10 => {
            out.push(Segment { a: e_bottom(), b: e_right() });
            out.push(Segment { a: e_left(), b: e_top() });
        }
        _ => unreachable!(),
    }
}

fn close_enough(a: Point2, b: Point2) -> bool {
    (a.x - b.x).abs() < JUNCTION_TOL && (a.y - b.y).abs() < JUNCTION_TOL
}

/// Arena node: each segment contributes two endpoint slots, threaded into
/// neighbouring segments' slots when their positions coincide within
/// `JUNCTION_TOL`. `prev`/`next` index into this same arena and can be
/// walked in either direction, which is how "reversible" chaining avoids
/// needing to flip segment orientation in place.
#[derive(Debug, Clone, Copy)]
struct Node {
    point: Point2,
    /// Index of the other endpoint of this node's own segment.
    twin: usize,
    next: Option<usize>,
    used: bool,
}

/// Merge the unordered multiset of raw segments into maximal polylines by
/// joining endpoints that coincide within tolerance. Preserves every input
/// segment exactly once across the output polylines.
fn chain_segments(segments: Vec<Segment>) -> Vec<Vec<Point2>> {
    let mut nodes: Vec<Node> = Vec::with_capacity(segments.len() * 2);
    for seg in &segments {
        let i = nodes.len();
        nodes.push(Node { point: seg.a, twin: i + 1, next: None, used: false });
        nodes.push(Node { point: seg.b, twin: i, next: None, used: false });
    }

    // link each node to the first not-yet-linked node (of a different
    // segment) whose point coincides with it.
    let n = nodes.len();
    let mut linked_to: Vec<Option<usize>> = vec![None; n];
    for i in 0..n {
        if linked_to[i].is_some() {
            continue;
        }
        let seg_i = i / 2;
        for j in (i + 1)..n {
            if j / 2 == seg_i || linked_to[j].is_some() {
                continue;
            }
            if close_enough(nodes[i].point, nodes[j].point) {
                linked_to[i] = Some(j);
                linked_to[j] = Some(i);
                break;
            }
        }
    }

    let mut polylines = Vec::new();
    for start_seg in 0..segments.len() {
        let start_a = start_seg * 2;
        if nodes[start_a].used {
            continue;
        }
        // walk backward from `start_a`'s twin side to find a true
        // polyline start (a node with no link, or already consumed).
        let mut head = start_a;
        loop {
            let twin = nodes[head].twin;
            match linked_to[twin] {
                Some(prev) if !nodes[prev / 2].used => head = prev,
                _ => break,
            }
            if head == start_a {
                break; // closed loop, stop walking
            }
        }

        let mut poly = vec![nodes[head].point];
        let mut cur = head;
        loop {
            nodes[cur / 2].used = true;
            let twin = nodes[cur].twin;
            poly.push(nodes[twin].point);
            match linked_to[twin] {
                Some(next) if !nodes[next / 2].used => cur = next,
                _ => break,
            }
            if cur / 2 == head / 2 {
                break;
            }
        }
        polylines.push(poly);
    }
    polylines
}
