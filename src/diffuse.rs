//! Diffuse light raytracing.
//!
//! Light scattered at hazy interfaces is traced as intensity packets without
//! interference. Packets decay as exp(−αx) inside a layer and split at every
//! boundary by the specular Fresnel reflectance. Forward/backward sweeps repeat
//! until the strongest packet leaving any layer drops below the configured
//! threshold or the iteration limit is reached.

use log::{debug, info};
use nalgebra::{Complex, Matrix2};
use ndarray::{Array1, Array2};

use crate::config::AMBIENT_INDEX;
use crate::helpers::bounded_exp;
use crate::interface::reflectance;
use crate::settings::{DiffuseSettings, Polarization};
use crate::stack::{EffectiveLayer, EffectiveStack};


/// Specular intensities at the two faces of one layer.
#[derive(Debug, Clone, Copy, Default)]
struct Specular {
    /// Forward intensity arriving at the bottom interface.
    fw_end: f64,
    /// Backward intensity arriving at the top interface.
    bw_start: f64,
}

/// Specular intensities of a layer from its field-form partial matrices.
fn specular(
    psi: &Matrix2<Complex<f64>>,
    pso: &Matrix2<Complex<f64>>,
    xi: Complex<f64>,
    thickness: f64,
    n: f64,
) -> Specular {
    let i = Complex::<f64>::i();
    let phase = bounded_exp(i * xi * thickness);
    let r_above = -psi[(0, 1)] / psi[(0, 0)];
    let r_below = pso[(1, 0)] / pso[(0, 0)];
    let t_above = 1.0 / psi[(0, 0)];
    let t_fw = t_above / (1.0 - r_above * r_below * phase * phase);
    Specular {
        fw_end: n * (t_fw * phase).norm_sqr(),
        bw_start: n * (t_fw * r_below * phase * phase).norm_sqr(),
    }
}

/// Result of diffuse raytracing.
#[derive(Debug, Clone)]
pub struct DiffuseLight {
    /// Forward diffuse intensity per layer, depth x wavelength.
    pub forward: Vec<Array2<f64>>,
    /// Backward diffuse intensity per layer, depth x wavelength.
    pub backward: Vec<Array2<f64>>,
    /// Diffuse light escaping through the top.
    pub reflection: Array1<f64>,
    /// Diffuse light escaping through the bottom.
    pub transmission: Array1<f64>,
    pub iterations: usize,
}

impl DiffuseLight {
    /// Total diffuse intensity inside layer `index`.
    pub fn intensity(&self, index: usize) -> Array2<f64> {
        &self.forward[index] + &self.backward[index]
    }
}

/// Specular reflectances of one boundary, seen from above (`down`) and below (`up`).
struct Boundary {
    down: Array1<f64>,
    up: Array1<f64>,
    haze_r: f64,
    haze_t: f64,
}

fn boundaries(stack: &EffectiveStack, pol: Polarization) -> Vec<Boundary> {
    let ambient = Complex::new(AMBIENT_INDEX, 0.0);
    let theta_in = Complex::new(stack.angle.to_radians(), 0.0);
    let count = stack.layers.len();
    (0..=count)
        .map(|j| {
            let upper = j.checked_sub(1).map(|i| &stack.layers[i]);
            let lower = stack.layers.get(j);
            let side = |layer: Option<&EffectiveLayer>, w: usize, exit: bool| match layer {
                Some(l) => (l.cri[w], l.theta[w]),
                None if exit => (ambient, stack.theta_out[w]),
                None => (ambient, theta_in),
            };
            let (down, up): (Vec<f64>, Vec<f64>) = (0..stack.wavelength.len())
                .map(|w| {
                    let (n1, t1) = side(upper, w, false);
                    let (n2, t2) = side(lower, w, true);
                    (reflectance(pol, n1, n2, t1, t2), reflectance(pol, n2, n1, t2, t1))
                })
                .unzip();
            Boundary {
                down: Array1::from(down),
                up: Array1::from(up),
                haze_r: lower.map_or(0.0, |l| l.haze.r),
                haze_t: lower.map_or(0.0, |l| l.haze.t),
            }
        })
        .collect()
}

/// Traces diffuse light through a composed stack. Layer partial matrices must be set.
///
/// **Context**: Rough interfaces scatter a haze fraction of the specular light
/// into diffuse light, which travels without interference and can bounce between
/// interfaces many times before it is absorbed or escapes.
///
/// **How it Works**: The specular intensity at both faces of every layer seeds
/// the first scattering at each boundary. Every sweep then propagates each packet
/// through its layer with exp(−αx), splits it at the next boundary by the Fresnel
/// reflectance, and collects what leaves through the top or bottom. Sweeps stop at
/// `max_iterations` or once the running peak drops below `min_intensity`.
pub fn raytrace(stack: &EffectiveStack, pol: Polarization, settings: &DiffuseSettings) -> DiffuseLight {
    info!("raytracing diffuse light...");
    let count = stack.layers.len();
    let wavelengths = stack.wavelength.len();
    let bounds = boundaries(stack, pol);
    let zeros = || Array1::<f64>::zeros(wavelengths);

    // specular light reaching the faces of every layer
    let spec: Vec<Vec<Specular>> = stack
        .layers
        .iter()
        .map(|layer| {
            (0..wavelengths)
                .map(|w| {
                    let (psi, pso) = if layer.thick {
                        (layer.psi[w].map(|z| z.sqrt()), layer.pso[w].map(|z| z.sqrt()))
                    } else {
                        (layer.psi[w], layer.pso[w])
                    };
                    specular(&psi, &pso, layer.xi[w], layer.thickness, layer.n[w])
                })
                .collect()
        })
        .collect();
    let face = |k: usize, f: fn(&Specular) -> f64| Array1::from_iter(spec[k].iter().map(f));

    // first scattering at every boundary
    let mut reflection = zeros();
    let mut transmission = zeros();
    let mut fw_t = Vec::with_capacity(count);
    let mut fw_r = Vec::with_capacity(count);
    let mut bw_t = Vec::with_capacity(count);
    let mut bw_r = Vec::with_capacity(count);
    for k in 0..count {
        let (top, bottom) = (&bounds[k], &bounds[k + 1]);
        fw_r.push(top.haze_r * &top.up * &face(k, |s| s.bw_start));
        bw_r.push(bottom.haze_r * &bottom.down * &face(k, |s| s.fw_end));
        let transmitted = top.down.mapv(|r| 1.0 - r) * top.haze_t;
        if k == 0 {
            // incident light scattered back, plus layer 0's backward wave scattered out
            let escaping = top.up.mapv(|r| 1.0 - r) * top.haze_t * &face(0, |s| s.bw_start);
            reflection = top.haze_r * &top.down + escaping;
            fw_t.push(transmitted);
        } else {
            fw_t.push(transmitted * &face(k - 1, |s| s.fw_end));
        }
        if k + 1 == count {
            bw_t.push(zeros());
        } else {
            bw_t.push(bottom.up.mapv(|r| 1.0 - r) * bottom.haze_t * &face(k + 1, |s| s.bw_start));
        }
    }

    // fixed decay tables and accumulators, reused every sweep
    let decay = |layer: &EffectiveLayer, depth: &dyn Fn(f64) -> f64| {
        Array2::from_shape_fn((layer.x.len(), wavelengths), |(i, w)| {
            (-layer.alpha[w] * depth(layer.x[i])).exp()
        })
    };
    let decay_fw: Vec<Array2<f64>> = stack.layers.iter().map(|l| decay(l, &|x| x)).collect();
    let decay_bw: Vec<Array2<f64>> = stack
        .layers
        .iter()
        .map(|l| decay(l, &|x| l.thickness - x))
        .collect();
    let through: Vec<Array1<f64>> = stack
        .layers
        .iter()
        .map(|l| l.alpha.mapv(|a| (-a * l.thickness).exp()))
        .collect();
    let mut forward: Vec<Array2<f64>> = decay_fw.iter().map(|d| Array2::zeros(d.raw_dim())).collect();
    let mut backward: Vec<Array2<f64>> = decay_bw.iter().map(|d| Array2::zeros(d.raw_dim())).collect();

    let mut iteration = 1;
    let mut peak = f64::INFINITY;
    loop {
        if iteration > settings.max_iterations {
            info!("diffuse raytracing stopped at the iteration limit ({iteration})");
            break;
        }
        if peak < settings.min_intensity {
            info!("diffuse intensity below threshold after {iteration} iterations");
            break;
        }
        let mut sweep_peak: f64 = 0.0;
        for k in 0..count {
            let fw_start = &fw_t[k] + &fw_r[k];
            let bw_start = &bw_t[k] + &bw_r[k];
            forward[k] += &(&decay_fw[k] * &fw_start);
            backward[k] += &(&decay_bw[k] * &bw_start);
            let fw_end = &fw_start * &through[k];
            let bw_end = &bw_start * &through[k];
            sweep_peak = fw_end.iter().chain(bw_end.iter()).fold(sweep_peak, |m, &v| m.max(v));

            let (top, bottom) = (&bounds[k], &bounds[k + 1]);
            let up_escape = &bw_end * &top.up.mapv(|r| 1.0 - r);
            let down_escape = &fw_end * &bottom.down.mapv(|r| 1.0 - r);
            fw_t[k].fill(0.0);
            bw_t[k].fill(0.0);
            fw_r[k] = &bw_end * &top.up;
            bw_r[k] = &fw_end * &bottom.down;
            if k == 0 {
                reflection += &up_escape;
            } else {
                bw_t[k - 1] = up_escape;
            }
            if k + 1 == count {
                transmission += &down_escape;
            } else {
                fw_t[k + 1] += &down_escape;
            }
        }
        peak = peak.min(sweep_peak);
        debug!("diffuse sweep {iteration}: peak intensity {sweep_peak:.3e}");
        iteration += 1;
    }

    DiffuseLight {
        forward,
        backward,
        reflection,
        transmission,
        iterations: iteration - 1,
    }
}
