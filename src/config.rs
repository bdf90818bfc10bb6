/// Refractive index of the ambient medium above and below the stack.
pub const AMBIENT_INDEX: f64 = 1.0;
/// Planck constant [J s].
pub const PLANCK: f64 = 6.62606957e-34;
/// Speed of light in vacuum [m/s].
pub const SPEED_OF_LIGHT: f64 = 2.99792458e8;
/// Elementary charge [C].
pub const ELEMENTARY_CHARGE: f64 = 1.602176e-19;
/// Photon energy [eV] times wavelength [nm].
pub const EV_NM: f64 = 1239.941;
/// Volume fraction of each neighbour in an effective-medium roughness layer.
pub const EMA_FILL_FRACTION: f64 = 0.5;
/// Largest real exponent of a field propagation factor. Opaque layers saturate
/// here instead of overflowing; intensities are bounded by twice this exponent.
pub const MAX_EXPONENT: f64 = 100.0;
/// Smallest |S00| accepted before the system matrix is considered singular.
pub const DIVISION_EPSILON: f64 = 1e-300;
/// Imaginary parts of a Snell sine below this are treated as round-off.
pub const SNELL_IMAG_TOLERANCE: f64 = 100.0 * f64::EPSILON;
/// Spectral irradiance [W/(m^2 nm)] used when no illumination spectrum is configured.
pub const FLAT_SPECTRAL_IRRADIANCE: f64 = 1.0;
/// Diffusion constant [cm^2/s] of the diffusion-length collection model.
pub const DIFFUSION_CONSTANT: f64 = 1.55;
/// Thermal voltage kT/q [eV] at 300 K.
pub const THERMAL_VOLTAGE: f64 = 8.617e-5 * 300.0;
