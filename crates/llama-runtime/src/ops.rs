//! Dense kernels for the reference model. Everything is row-major `f32`.

/// Root Mean Square layer normalization: `y = x / RMS(x) * weight`.
pub(crate) fn rms_norm(x: &[f32], weight: &[f32], eps: f32) -> Vec<f32> {
    let mean_sq: f32 = x.iter().map(|v| v * v).sum::<f32>() / x.len() as f32;
    let rms = (mean_sq + eps).sqrt();
    x.iter().zip(weight).map(|(v, w)| v / rms * w).collect()
}

/// `x @ W` where `W` is `[in_dim, out_dim]` row-major.
pub(crate) fn matvec(x: &[f32], w: &[f32], out_dim: usize) -> Vec<f32> {
    let mut out = vec![0.0; out_dim];
    for (j, &xj) in x.iter().enumerate() {
        let row = &w[j * out_dim..(j + 1) * out_dim];
        for (o, &wij) in out.iter_mut().zip(row) {
            *o += xj * wij;
        }
    }
    out
}

pub(crate) fn dot(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

/// Rotate each `(x[2i], x[2i+1])` pair of every head by a position-dependent angle.
pub(crate) fn apply_rope(x: &mut [f32], position: usize, head_dim: usize, base: f32) {
    for head in x.chunks_exact_mut(head_dim) {
        for i in 0..head_dim / 2 {
            let inv_freq = 1.0 / base.powf(2.0 * i as f32 / head_dim as f32);
            let angle = position as f32 * inv_freq;
            let (sin, cos) = angle.sin_cos();
            let x0 = head[2 * i];
            let x1 = head[2 * i + 1];
            head[2 * i] = x0 * cos - x1 * sin;
            head[2 * i + 1] = x0 * sin + x1 * cos;
        }
    }
}

/// Single-query causal attention over `seq_len` cached positions.
///
/// `keys`/`values` are `[seq_len, n_heads * head_dim]`. `scores` is scratch
/// space, resized as needed.
pub(crate) fn attention_decode(
    q: &[f32],
    keys: &[f32],
    values: &[f32],
    seq_len: usize,
    head_dim: usize,
    scores: &mut Vec<f32>,
) -> Vec<f32> {
    let d = q.len();
    let scale = 1.0 / (head_dim as f32).sqrt();
    let mut out = vec![0.0; d];

    for h in 0..d / head_dim {
        let lo = h * head_dim;
        let hi = lo + head_dim;

        scores.clear();
        scores.extend((0..seq_len).map(|t| dot(&q[lo..hi], &keys[t * d + lo..t * d + hi]) * scale));

        let max = scores.iter().cloned().fold(f32::NEG_INFINITY, f32::max);
        let mut sum = 0.0;
        for s in scores.iter_mut() {
            *s = (*s - max).exp();
            sum += *s;
        }

        for (t, &s) in scores.iter().enumerate() {
            let weight = s / sum;
            for (o, &v) in out[lo..hi].iter_mut().zip(&values[t * d + lo..t * d + hi]) {
                *o += weight * v;
            }
        }
    }

    out
}

/// SwiGLU feed-forward: `(silu(x W_gate) * (x W_up)) W_down`.
pub(crate) fn mlp_swiglu(
    x: &[f32],
    w_gate: &[f32],
    w_up: &[f32],
    w_down: &[f32],
    d_model: usize,
    d_ff: usize,
) -> Vec<f32> {
    let gate = matvec(x, w_gate, d_ff);
    let up = matvec(x, w_up, d_ff);
    let hidden: Vec<f32> = gate
        .iter()
        .zip(&up)
        .map(|(&g, &u)| g / (1.0 + (-g).exp()) * u)
        .collect();
    matvec(&hidden, w_down, d_model)
}
