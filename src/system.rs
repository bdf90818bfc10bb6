//! Mixed coherent/incoherent system matrix.
//!
//! Maximal runs of thin layers are multiplied coherently and folded into an
//! intensity matrix; thick layers contribute their intensity matrices directly.
//! Partial products above and below every layer are kept for reconstructing
//! the field inside it.

use itertools::Itertools;
use nalgebra::{Complex, Matrix2};
use ndarray::Array1;

use crate::config::DIVISION_EPSILON;
use crate::errors::{Result, StackError};
use crate::interface::InterfaceSet;
use crate::stack::EffectiveStack;

type M = Matrix2<Complex<f64>>;

#[cfg(test)]
mod tests {
    use super::*;

    fn c(re: f64) -> Complex<f64> {
        Complex::new(re, 0.0)
    }

    #[test]
    fn fold_of_identity_is_identity() {
        assert!((fold(&M::identity()) - M::identity()).norm() < 1e-15);
    }

    #[test]
    fn fold_keeps_intensity_ratios() {
        let coh = M::new(c(2.0), Complex::new(0.0, 1.0), c(0.5), c(1.0));
        let inc = fold(&coh);
        assert!((inc[(0, 0)].re - 4.0).abs() < 1e-15);
        assert!((inc[(0, 1)].re + 1.0).abs() < 1e-15);
        assert!((inc[(1, 0)].re - 0.25).abs() < 1e-15);
        // |det|² = |2 - 0.5i|² = 4.25
        assert!((inc[(1, 1)].re - (4.25 - 0.25) / 4.0).abs() < 1e-15);
    }

    #[test]
    fn scalars_from_system() {
        let s = M::new(c(2.0), c(0.0), c(0.5), c(1.0));
        let (r, t) = reflect_transmit(&s, 500.0).unwrap();
        assert!((r - 0.25).abs() < 1e-15);
        assert!((t - 0.5).abs() < 1e-15);
    }

    #[test]
    fn singular_system_is_numeric_failure() {
        let s = M::new(c(0.0), c(0.0), c(1.0), c(1.0));
        assert!(matches!(
            reflect_transmit(&s, 500.0),
            Err(StackError::Numeric { .. })
        ));
        let s = M::new(c(f64::INFINITY), c(0.0), c(1.0), c(1.0));
        assert!(reflect_transmit(&s, 500.0).is_err());
    }
}

/// Coherent layer runs and incoherent layers in stack order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Segment {
    /// Thin layers `start..end`.
    Thin(usize, usize),
    Thick(usize),
}

/// Splits the stack into maximal runs of thin layers and single thick layers.
pub fn segments(stack: &EffectiveStack) -> Vec<Segment> {
    let layers = &stack.layers;
    let mut segs = Vec::new();
    let chunks = (0..layers.len()).chunk_by(|&i| layers[i].thick);
    for (thick, group) in &chunks {
        let members: Vec<usize> = group.collect();
        if thick {
            segs.extend(members.into_iter().map(Segment::Thick));
        } else if let (Some(&start), Some(&last)) = (members.first(), members.last()) {
            segs.push(Segment::Thin(start, last + 1));
        }
    }
    segs
}

/// Intensity-matrix equivalent of a coherent matrix.
pub fn fold(s: &M) -> M {
    let s00 = s[(0, 0)].norm_sqr();
    let s01 = s[(0, 1)].norm_sqr();
    let s10 = s[(1, 0)].norm_sqr();
    let det = s.determinant().norm_sqr();
    let cross = (s[(0, 1)] * s[(1, 0)]).norm_sqr();
    Matrix2::new(s00, -s01, s10, (det - cross) / s00).map(|v| Complex::new(v, 0.0))
}

/// Element-wise square root, mapping intensity factors to field magnitudes.
fn sqrt(m: &M) -> M {
    m.map(|z| z.sqrt())
}

/// R = |S10/S00| and T = |1/S00|, refusing singular or overflowed systems.
pub fn reflect_transmit(s: &M, wavelength: f64) -> Result<(f64, f64)> {
    let s00 = s[(0, 0)];
    if !s00.is_finite() || s00.norm() < DIVISION_EPSILON {
        return Err(StackError::Numeric {
            wavelength,
            reason: format!("system matrix element S00 = {s00} cannot be inverted"),
        });
    }
    Ok(((s[(1, 0)] / s00).norm(), (1.0 / s00).norm()))
}

/// Fully coherent system matrix of all layers at wavelength index `w`.
pub fn field_system(stack: &EffectiveStack, interfaces: &InterfaceSet, w: usize) -> M {
    stack
        .layers
        .iter()
        .zip(&interfaces.below)
        .fold(interfaces.top.coherent[w], |acc, (layer, below)| {
            acc * layer.layer_matrix[w] * below.coherent[w]
        })
}

/// Composed system of a stack for every wavelength.
#[derive(Debug, Clone)]
pub struct Composition {
    /// Mixed system matrix (intensity form).
    pub system: Vec<M>,
    /// Fully coherent field matrix.
    pub field_system: Vec<M>,
    /// Partial matrix above each layer, `[layer][wavelength]`.
    pub psi: Vec<Vec<M>>,
    /// Partial matrix below each layer, `[layer][wavelength]`.
    pub pso: Vec<Vec<M>>,
    pub reflection: Array1<f64>,
    pub transmission: Array1<f64>,
    pub absorption: Array1<f64>,
}

enum Element {
    Block(M),
    Layer(usize),
}

/// Composes the mixed coherent/incoherent system matrix of a stack.
///
/// **Context**: Layers much thicker than the coherence length of the light lose
/// their phase information, so a stack cannot be multiplied coherently end to end.
/// Field reconstruction inside any layer also needs everything above and below it.
///
/// **How it Works**: For every wavelength, each thin run is multiplied as field
/// matrices and folded into intensity form. The folded blocks and the intensity
/// matrices of thick layers and their interfaces form one element chain, whose
/// prefix and suffix products give the partials of the thick layers. Thin layers
/// keep their partials within the run; a run bordering a thick layer is extended
/// by the element-wise square root of that neighbour's intensity partial. R, T
/// and A follow from the full product.
pub fn compose(stack: &EffectiveStack, interfaces: &InterfaceSet) -> Result<Composition> {
    let count = stack.layers.len();
    let wavelengths = stack.wavelength.len();
    let segs = segments(stack);

    let mut composition = Composition {
        system: Vec::with_capacity(wavelengths),
        field_system: Vec::with_capacity(wavelengths),
        psi: vec![vec![M::zeros(); wavelengths]; count],
        pso: vec![vec![M::zeros(); wavelengths]; count],
        reflection: Array1::zeros(wavelengths),
        transmission: Array1::zeros(wavelengths),
        absorption: Array1::zeros(wavelengths),
    };

    for w in 0..wavelengths {
        let layer = |i: usize| &stack.layers[i];
        let below = |i: usize| interfaces.below[i].coherent[w];
        let mut psi_local = vec![M::zeros(); count];
        let mut pso_local = vec![M::zeros(); count];
        let mut elements = Vec::with_capacity(2 * segs.len() + 1);

        if let Some(Segment::Thick(_)) = segs.first() {
            elements.push(Element::Block(interfaces.top.incoherent[w]));
        }
        for (si, seg) in segs.iter().enumerate() {
            match *seg {
                Segment::Thin(start, end) => {
                    let mut acc = match start {
                        0 => interfaces.top.coherent[w],
                        _ => below(start - 1),
                    };
                    for l in start..end {
                        psi_local[l] = acc;
                        acc = acc * layer(l).layer_matrix[w] * below(l);
                    }
                    let mut suffix = below(end - 1);
                    pso_local[end - 1] = suffix;
                    for l in (start..end - 1).rev() {
                        suffix = below(l) * layer(l + 1).layer_matrix[w] * suffix;
                        pso_local[l] = suffix;
                    }
                    elements.push(Element::Block(fold(&acc)));
                }
                Segment::Thick(t) => {
                    elements.push(Element::Layer(t));
                    if !matches!(segs.get(si + 1), Some(Segment::Thin(..))) {
                        elements.push(Element::Block(interfaces.below[t].incoherent[w]));
                    }
                }
            }
        }

        let matrix = |e: &Element| match *e {
            Element::Block(m) => m,
            Element::Layer(t) => layer(t).layer_matrix_inc[w],
        };
        // prefix[p] = product of elements[..p], suffix[p] = product of elements[p..]
        let mut prefix = Vec::with_capacity(elements.len() + 1);
        prefix.push(M::identity());
        for e in &elements {
            let last = prefix[prefix.len() - 1];
            prefix.push(last * matrix(e));
        }
        let mut suffix = vec![M::identity(); elements.len() + 1];
        for p in (0..elements.len()).rev() {
            suffix[p] = matrix(&elements[p]) * suffix[p + 1];
        }
        let system = prefix[elements.len()];

        for (p, e) in elements.iter().enumerate() {
            if let Element::Layer(t) = *e {
                composition.psi[t][w] = prefix[p];
                composition.pso[t][w] = suffix[p + 1];
            }
        }

        // thin layers see adjacent thick layers through intensity magnitudes
        for seg in &segs {
            let Segment::Thin(start, end) = *seg else {
                continue;
            };
            let above = (start > 0 && layer(start - 1).thick).then(|| {
                let t = start - 1;
                sqrt(&(composition.psi[t][w] * layer(t).layer_matrix_inc[w]))
            });
            let beneath = (end < count && layer(end).thick).then(|| {
                sqrt(&layer(end).layer_matrix_inc[w]) * sqrt(&composition.pso[end][w])
            });
            for l in start..end {
                composition.psi[l][w] = match above {
                    Some(m) => m * psi_local[l],
                    None => psi_local[l],
                };
                composition.pso[l][w] = match beneath {
                    Some(m) => pso_local[l] * m,
                    None => pso_local[l],
                };
            }
        }

        let (r, t) = reflect_transmit(&system, stack.wavelength[w])?;
        composition.reflection[w] = r;
        composition.transmission[w] = t;
        composition.absorption[w] = 1.0 - r - t;
        composition.system.push(system);
        composition.field_system.push(field_system(stack, interfaces, w));
    }

    Ok(composition)
}
