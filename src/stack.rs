//! Stack assembly.
//!
//! Expands the user layer list into effective layers: roughness interlayers are
//! inserted above rough layers, graded layers are split into thin sub-layers,
//! and every effective layer receives its refractive index on the master grid,
//! its propagation angle and its propagation matrices.

use log::{debug, info};
use nalgebra::{Complex, Matrix2, Vector2};
use ndarray::{s, Array1};
use std::f64::consts::PI;

use crate::config::AMBIENT_INDEX;
use crate::ema;
use crate::errors::Result;
use crate::grading::{GradingCurve, GradingTable};
use crate::helpers::bounded_exp;
use crate::layer::{CriSource, Grading, Layer, StackDefinition};
use crate::material::CriProvider;
use crate::output;
use crate::settings::{CompositionSampling, Settings};
use crate::snell;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layer::{CompositionProfile, GradingReference, Meshing, Roughness};
    use crate::material::RawCri;
    use crate::settings::load_default_config;
    use std::path::PathBuf;

    /// Constant sources on the grid; grading references have n = 3 + fraction.
    struct InMemory;

    impl CriProvider for InMemory {
        fn raw_cri(&self, layer: &EffectiveLayer, grid: &Array1<f64>) -> Result<RawCri> {
            match &layer.source {
                CriSource::Constant { n, k } => Ok(RawCri::constant(grid, *n, *k)),
                _ => Err(crate::errors::StackError::load(layer.name.clone(), "unsupported")),
            }
        }

        fn grading_curve(&self, _: &EffectiveLayer, reference: &GradingReference) -> Result<RawCri> {
            Ok(RawCri {
                wavelength: vec![100.0, 3000.0],
                n: vec![3.0 + reference.fraction; 2],
                k: vec![0.1; 2],
            })
        }
    }

    fn settings() -> Settings {
        let mut settings = load_default_config().unwrap();
        settings.export_dir = None;
        settings.wavelength.start = 400.0;
        settings.wavelength.end = 600.0;
        settings.wavelength.step = 50.0;
        settings
    }

    fn graded(thickness: f64) -> Layer {
        let reference = |fraction| GradingReference {
            fraction,
            band_gap: 1.0 + fraction,
            path: PathBuf::from("unused"),
        };
        Layer::new(
            "absorber",
            thickness,
            CriSource::Graded(Grading {
                profile: CompositionProfile::Linear { top: 0.0, bottom: 1.0 },
                references: vec![reference(0.0), reference(1.0)],
            }),
        )
        .with_mesh(Meshing::Points { count: 21 })
    }

    #[test]
    fn roughness_layer_inserted_above() {
        let stack = StackDefinition::new(vec![
            Layer::new("top", 100.0, CriSource::Constant { n: 2.0, k: 0.0 }),
            Layer::new("bottom", 200.0, CriSource::Constant { n: 3.0, k: 0.0 }).with_roughness(
                Roughness { thickness: 10.0, haze_r: 0.1, haze_t: 0.3 },
            ),
        ])
        .unwrap();
        let eff = assemble(&stack, &settings(), &InMemory).unwrap();
        let names: Vec<&str> = eff.layers.iter().map(|l| l.name.as_str()).collect();
        assert_eq!(names, vec!["top", "bottom_rough", "bottom"]);
        let rough = &eff.layers[1];
        assert_eq!(rough.parent, "bottom");
        assert_eq!(rough.thickness, 10.0);
        assert_eq!(rough.haze.r, 0.1);
        assert_eq!(eff.layers[2].haze, Haze::default());
        assert_eq!(eff.layers[2].roughness_sigma, 10.0);
        assert!(rough.n.iter().all(|&n| n > 2.0 && n < 3.0));
        assert!(eff.haze_on);
    }

    #[test]
    fn roughness_without_ema_keeps_haze_on_layer() {
        let mut settings = settings();
        settings.roughness.ema_layer = false;
        let stack = StackDefinition::new(vec![Layer::new(
            "film",
            100.0,
            CriSource::Constant { n: 2.0, k: 0.0 },
        )
        .with_roughness(Roughness { thickness: 10.0, haze_r: 0.2, haze_t: 0.0 })])
        .unwrap();
        let eff = assemble(&stack, &settings, &InMemory).unwrap();
        assert_eq!(eff.layers.len(), 1);
        assert_eq!(eff.layers[0].haze.r, 0.2);
    }

    #[test]
    fn graded_layer_split_into_owned_slices() {
        let stack = StackDefinition::new(vec![graded(200.0)]).unwrap();
        let mut settings = settings();
        settings.grading.advanced = false;
        let eff = assemble(&stack, &settings, &InMemory).unwrap();
        // 21 nodes in blocks of 5 give 4 sub-layers of 6 nodes plus a single-node remainder
        assert_eq!(eff.layers.len(), 4);
        let total: f64 = eff.layers.iter().map(|l| l.thickness).sum();
        assert!((total - 200.0).abs() < 1e-9);
        for (no, layer) in eff.layers.iter().enumerate() {
            assert_eq!(layer.name, format!("absorber_graded{no}"));
            assert_eq!(layer.parent, "absorber");
            assert_eq!(layer.x[0], 0.0);
            assert_eq!(layer.x.len(), layer.fc.len());
        }
        // composition sampled at the start of each slice
        assert_eq!(eff.layers[0].composition, Some(0.0));
        assert!((eff.layers[1].composition.unwrap() - 0.25).abs() < 1e-12);
        assert!((eff.layers[1].n[0] - 3.25).abs() < 1e-9);
    }

    #[test]
    fn matrices_built_for_every_layer() {
        let stack = StackDefinition::new(vec![
            Layer::new("film", 100.0, CriSource::Constant { n: 2.0, k: 0.1 }),
            Layer::new("substrate", 1e5, CriSource::Constant { n: 1.5, k: 0.0 }).thick(),
        ])
        .unwrap();
        let eff = assemble(&stack, &settings(), &InMemory).unwrap();
        for layer in &eff.layers {
            assert_eq!(layer.layer_matrix.len(), eff.wavelength.len());
            assert_eq!(layer.layer_matrix_inc.len(), eff.wavelength.len());
        }
        let film = &eff.layers[0];
        let l = film.layer_matrix[0];
        let li = film.layer_matrix_inc[0];
        assert!((l[(0, 0)].norm_sqr() - li[(0, 0)].re).abs() < 1e-9);
        assert!(li[(1, 1)].re < 1.0);
        assert!((film.alpha[0] - 4.0 * PI * 0.1 / 400.0).abs() < 1e-15);
    }

    #[test]
    fn missing_source_aborts() {
        let stack = StackDefinition::new(vec![Layer::new(
            "film",
            100.0,
            CriSource::Material { name: "nope".into() },
        )])
        .unwrap();
        assert!(assemble(&stack, &settings(), &InMemory).is_err());
    }
}

/// Haze coefficients of a layer's top interface.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Haze {
    /// Diffusely reflected fraction.
    pub r: f64,
    /// Diffusely transmitted fraction.
    pub t: f64,
}

impl Haze {
    pub fn is_zero(&self) -> bool {
        self.r == 0.0 && self.t == 0.0
    }
}

/// Origin of an effective layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LayerKind {
    Regular,
    /// Effective-medium interlayer above a rough layer.
    Roughness,
    /// Slice of a graded layer.
    GradedSlice,
}

/// Coherent and incoherent matrices of one interface, one per wavelength.
#[derive(Debug, Clone, Default)]
pub struct InterfaceMatrices {
    pub coherent: Vec<Matrix2<Complex<f64>>>,
    pub incoherent: Vec<Matrix2<Complex<f64>>>,
}

/// A physical layer as seen by the optics engine.
#[derive(Debug, Clone)]
pub struct EffectiveLayer {
    pub name: String,
    /// Name of the user layer this layer was derived from.
    pub parent: String,
    /// Position of the parent in the user layer list.
    pub parent_index: usize,
    pub kind: LayerKind,
    pub source: CriSource,
    pub thickness: f64,
    pub thick: bool,
    /// Depth nodes, 0 at the top interface.
    pub x: Array1<f64>,
    /// Collection efficiency at each depth node.
    pub fc: Array1<f64>,
    /// Composition fraction of graded slices.
    pub composition: Option<f64>,
    /// RMS roughness of the top interface for Fresnel damping.
    pub roughness_sigma: f64,
    pub haze: Haze,
    pub n: Array1<f64>,
    pub k: Array1<f64>,
    pub cri: Array1<Complex<f64>>,
    /// Absorption coefficient 4πk/λ in 1/nm.
    pub alpha: Array1<f64>,
    pub theta: Array1<Complex<f64>>,
    /// Normal wave-vector component 2π n cosθ / λ.
    pub xi: Array1<Complex<f64>>,
    pub layer_matrix: Vec<Matrix2<Complex<f64>>>,
    pub layer_matrix_inc: Vec<Matrix2<Complex<f64>>>,
    /// Interface below this layer. Filled by the optics engine.
    pub interface: InterfaceMatrices,
    /// Partial system matrix above the layer (field form for thin layers,
    /// intensity form for thick ones). Filled by the optics engine.
    pub psi: Vec<Matrix2<Complex<f64>>>,
    /// Partial system matrix below the layer.
    pub pso: Vec<Matrix2<Complex<f64>>>,
}

impl EffectiveLayer {
    fn new(name: String, parent: &Layer, parent_index: usize, kind: LayerKind) -> Self {
        Self {
            name,
            parent: parent.name.clone(),
            parent_index,
            kind,
            source: parent.cri.clone(),
            thickness: parent.thickness,
            thick: parent.thick,
            x: Array1::zeros(0),
            fc: Array1::zeros(0),
            composition: None,
            roughness_sigma: 0.0,
            haze: Haze::default(),
            n: Array1::zeros(0),
            k: Array1::zeros(0),
            cri: Array1::zeros(0),
            alpha: Array1::zeros(0),
            theta: Array1::zeros(0),
            xi: Array1::zeros(0),
            layer_matrix: Vec::new(),
            layer_matrix_inc: Vec::new(),
            interface: InterfaceMatrices::default(),
            psi: Vec::new(),
            pso: Vec::new(),
        }
    }
}

/// Assembled stack handed to the optics engine.
#[derive(Debug, Clone)]
pub struct EffectiveStack {
    pub layers: Vec<EffectiveLayer>,
    /// Master wavelength grid in nm.
    pub wavelength: Array1<f64>,
    /// Angle of incidence in degrees.
    pub angle: f64,
    /// Illumination scale factor.
    pub intensity: f64,
    /// Any interface scatters diffusely and diffuse raytracing is enabled.
    pub haze_on: bool,
    /// User layer names, top first.
    pub parents: Vec<String>,
    /// Ambient-to-first-layer interface. Filled by the optics engine.
    pub top_interface: InterfaceMatrices,
    /// Propagation angle in the exit ambient.
    pub theta_out: Array1<Complex<f64>>,
}

impl EffectiveStack {
    /// Effective layer indices belonging to each user layer, in user order.
    pub fn groups(&self) -> Vec<(String, Vec<usize>)> {
        self.parents
            .iter()
            .enumerate()
            .map(|(pi, name)| {
                let members = (0..self.layers.len())
                    .filter(|&i| self.layers[i].parent_index == pi)
                    .collect();
                (name.clone(), members)
            })
            .collect()
    }

    /// Depth of every node of every layer measured from the stack top.
    pub fn global_depth(&self) -> Array1<f64> {
        let mut offset = 0.0;
        let mut depth = Vec::new();
        for layer in &self.layers {
            depth.extend(layer.x.iter().map(|x| x + offset));
            offset += layer.thickness;
        }
        Array1::from(depth)
    }
}

/// Builds effective stacks from user layer lists.
///
/// **Context**: The user describes a stack as physical layers. The optics engine
/// needs one entry per optically distinct slab, each with its index on the master
/// grid and its propagation matrices ready.
///
/// **How it Works**: Roughness interlayers and graded slices are created first,
/// each remembering its parent layer. Indices then come from the [`CriProvider`]
/// (or the grading table and the effective-medium rule), and finally the Snell
/// angle chain and the layer matrices are built for every wavelength.
pub struct StackAssembler<'a> {
    settings: &'a Settings,
    provider: &'a dyn CriProvider,
}

/// Convenience wrapper around [`StackAssembler::assemble`].
pub fn assemble(
    user: &StackDefinition,
    settings: &Settings,
    provider: &dyn CriProvider,
) -> Result<EffectiveStack> {
    StackAssembler::new(settings, provider).assemble(user)
}

impl<'a> StackAssembler<'a> {
    pub fn new(settings: &'a Settings, provider: &'a dyn CriProvider) -> Self {
        Self { settings, provider }
    }

    /// Expands `user` into an [`EffectiveStack`]. Writes the nk exports when
    /// `export_dir` is set. A source that cannot be loaded aborts the assembly.
    pub fn assemble(&self, user: &StackDefinition) -> Result<EffectiveStack> {
        let grid = self.settings.grid();
        info!(
            "assembling {} layers on {} wavelengths ({} - {} nm)",
            user.layers.len(),
            grid.len(),
            self.settings.wavelength.start,
            self.settings.wavelength.end
        );

        let mut layers = self.expand(user);
        self.resolve_cri(&mut layers, user, &grid)?;
        let (theta_out, haze_on) = self.build_matrices(&mut layers, &grid);

        if let Some(dir) = &self.settings.export_dir {
            for layer in &layers {
                output::write_nk(dir, &layer.name, &grid, &layer.n, &layer.k)?;
            }
        }

        for layer in &layers {
            debug!(
                "{:<24} {:>12.2} nm  {:<9} parent {}",
                layer.name,
                layer.thickness,
                if layer.thick { "thick" } else { "thin" },
                layer.parent
            );
        }
        info!("assembled {} effective layers, haze {}", layers.len(), haze_on);

        Ok(EffectiveStack {
            layers,
            wavelength: grid,
            angle: self.settings.angle,
            intensity: self.settings.intensity_scale(),
            haze_on,
            parents: user.layers.iter().map(|l| l.name.clone()).collect(),
            top_interface: InterfaceMatrices::default(),
            theta_out,
        })
    }

    /// Roughness and graded expansion, without refractive indices.
    fn expand(&self, user: &StackDefinition) -> Vec<EffectiveLayer> {
        let mut layers = Vec::new();
        for (pi, layer) in user.layers.iter().enumerate() {
            let x = layer.mesh.nodes(layer.thickness);
            let fc = layer.collection.profile(&x, layer.thickness);
            let mut sigma = 0.0;
            let mut haze = Haze::default();
            if let Some(rough) = &layer.roughness {
                sigma = rough.thickness;
                haze = Haze { r: rough.haze_r, t: rough.haze_t };
                if rough.thickness > 0.0 && self.settings.roughness.ema_layer {
                    debug!("adding roughness interlayer above {}", layer.name);
                    let mut interlayer = EffectiveLayer::new(
                        format!("{}_rough", layer.name),
                        layer,
                        pi,
                        LayerKind::Roughness,
                    );
                    interlayer.thickness = rough.thickness;
                    interlayer.thick = false;
                    interlayer.x = layer.mesh.nodes(rough.thickness);
                    interlayer.fc = layer.collection.profile(&interlayer.x, rough.thickness);
                    interlayer.haze = haze;
                    layers.push(interlayer);
                    haze = Haze::default();
                }
            }

            match &layer.cri {
                CriSource::Graded(grading) => {
                    let slices = self.split_graded(layer, pi, grading, &x, &fc);
                    debug!("split graded layer {} into {} sub-layers", layer.name, slices.len());
                    let first = layers.len();
                    layers.extend(slices);
                    if let Some(top) = layers.get_mut(first) {
                        top.roughness_sigma = sigma;
                        top.haze = haze;
                    }
                }
                _ => {
                    let mut eff = EffectiveLayer::new(layer.name.clone(), layer, pi, LayerKind::Regular);
                    eff.x = x;
                    eff.fc = fc;
                    eff.roughness_sigma = sigma;
                    eff.haze = haze;
                    layers.push(eff);
                }
            }
        }
        layers
    }

    /// One sub-layer per block of `grading.step` mesh nodes. Neighbouring slices
    /// share their boundary node.
    fn split_graded(
        &self,
        layer: &Layer,
        pi: usize,
        grading: &Grading,
        x: &Array1<f64>,
        fc: &Array1<f64>,
    ) -> Vec<EffectiveLayer> {
        let step = self.settings.grading.step;
        let composition = grading.profile.profile(x, layer.thickness);
        let len = x.len();
        (0..len)
            .step_by(step)
            .map(|idx| (idx, (idx + step + 1).min(len)))
            .filter(|(idx, end)| end - idx >= 2)
            .enumerate()
            .map(|(no, (idx, end))| {
                let mut sub = EffectiveLayer::new(
                    format!("{}_graded{}", layer.name, no),
                    layer,
                    pi,
                    LayerKind::GradedSlice,
                );
                let origin = x[idx];
                sub.x = x.slice(s![idx..end]).mapv(|v| v - origin);
                sub.thickness = sub.x[sub.x.len() - 1];
                sub.fc = fc.slice(s![idx..end]).to_owned();
                let slice = composition.slice(s![idx..end]);
                sub.composition = Some(match self.settings.grading.sampling {
                    CompositionSampling::Start => slice[0],
                    CompositionSampling::Centre => slice[slice.len() / 2],
                    CompositionSampling::Mean => slice.mean().unwrap_or(slice[0]),
                });
                sub
            })
            .collect()
    }

    fn resolve_cri(
        &self,
        layers: &mut [EffectiveLayer],
        user: &StackDefinition,
        grid: &Array1<f64>,
    ) -> Result<()> {
        // regular layers
        for layer in layers.iter_mut().filter(|l| l.kind == LayerKind::Regular) {
            let raw = self.provider.raw_cri(layer, grid)?;
            let subject = format!("refractive index of layer '{}'", layer.name);
            (layer.n, layer.k) = raw.resample(grid, &subject)?;
        }

        // graded slices, one reference table per parent
        for (pi, parent) in user.layers.iter().enumerate() {
            let CriSource::Graded(grading) = &parent.cri else {
                continue;
            };
            let members: Vec<usize> = (0..layers.len())
                .filter(|&i| layers[i].parent_index == pi && layers[i].kind == LayerKind::GradedSlice)
                .collect();
            let Some(&first) = members.first() else {
                continue;
            };
            let mut curves = Vec::with_capacity(grading.references.len());
            for reference in &grading.references {
                let raw = self.provider.grading_curve(&layers[first], reference)?;
                let subject = format!(
                    "grading reference x={} of layer '{}'",
                    reference.fraction, parent.name
                );
                let (n, k) = raw.resample(grid, &subject)?;
                curves.push(GradingCurve {
                    fraction: reference.fraction,
                    band_gap: reference.band_gap,
                    n,
                    k,
                });
            }
            let table = GradingTable::new(&parent.name, grid.clone(), curves)?;
            for &i in &members {
                let fraction = layers[i].composition.unwrap_or(0.0);
                (layers[i].n, layers[i].k) = table.resolve(fraction, self.settings.grading.advanced)?;
            }
        }

        // roughness interlayers from their neighbours
        let ambient = (
            Array1::from_elem(grid.len(), AMBIENT_INDEX),
            Array1::zeros(grid.len()),
        );
        for i in 0..layers.len() {
            if layers[i].kind != LayerKind::Roughness {
                continue;
            }
            let above = match i {
                0 => (&ambient.0, &ambient.1),
                _ => (&layers[i - 1].n, &layers[i - 1].k),
            };
            let below = match layers.get(i + 1) {
                Some(next) => (&next.n, &next.k),
                None => (&ambient.0, &ambient.1),
            };
            let (n, k) = ema::mix(self.settings.roughness.ema_model, above, below);
            layers[i].n = n;
            layers[i].k = k;
        }
        Ok(())
    }

    /// Angles and propagation matrices. Returns the exit angle and the haze flag.
    fn build_matrices(
        &self,
        layers: &mut [EffectiveLayer],
        grid: &Array1<f64>,
    ) -> (Array1<Complex<f64>>, bool) {
        for layer in layers.iter_mut() {
            layer.cri = Array1::from_iter(
                layer.n.iter().zip(layer.k.iter()).map(|(&n, &k)| Complex::new(n, k)),
            );
            layer.alpha = Array1::from_iter(
                layer.k.iter().zip(grid.iter()).map(|(&k, &w)| 4.0 * PI * k / w),
            );
        }

        let cri: Vec<Array1<Complex<f64>>> = layers.iter().map(|l| l.cri.clone()).collect();
        let (angles, theta_out) = snell::angle_chain(&cri, self.settings.angle);

        for (layer, theta) in layers.iter_mut().zip(angles) {
            layer.xi = Array1::from_iter(
                (0..grid.len()).map(|w| 2.0 * PI * layer.cri[w] * theta[w].cos() / grid[w]),
            );
            layer.theta = theta;
            let i = Complex::<f64>::i();
            let (field, intensity): (Vec<_>, Vec<_>) = layer
                .xi
                .iter()
                .map(|&xi| {
                    let down = bounded_exp(-i * xi * layer.thickness);
                    let up = bounded_exp(i * xi * layer.thickness);
                    (
                        Matrix2::from_diagonal(&Vector2::new(down, up)),
                        Matrix2::from_diagonal(&Vector2::new(
                            Complex::from(down.norm_sqr()),
                            Complex::from(up.norm_sqr()),
                        )),
                    )
                })
                .unzip();
            layer.layer_matrix = field;
            layer.layer_matrix_inc = intensity;
        }

        let haze_on = self.settings.diffuse.enabled && layers.iter().any(|l| !l.haze.is_zero());
        (theta_out, haze_on)
    }
}
