/// The mass of a proton, the default charge carrier
pub const PROTON: f64 = 1.00727646677;

/// The mass difference between successive isotopic peaks, the mass of one
/// additional neutron in an average heavy isotope substitution
pub const NEUTRON_SHIFT: f64 = 1.00335;

#[inline]
pub fn mass_charge_ratio(mass: f64, z: i32) -> f64 {
    (mass / (z.abs() as f64)) + z.signum() as f64 * PROTON
}

#[inline]
pub fn neutral_mass(mz: f64, z: i32) -> f64 {
    (mz * z.abs() as f64) - z as f64 * PROTON
}

/// The expected m/z distance between neighboring isotopic peaks at charge `z`
#[inline]
pub fn isotopic_spacing(z: i32) -> f64 {
    NEUTRON_SHIFT / (z.abs() as f64)
}
