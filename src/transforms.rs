//! Maps between constrained variable domains and unconstrained space.
//!
//! Gradient-based samplers run their dynamics in unconstrained space, so a
//! site whose natural domain is constrained (e.g. positive reals) carries a
//! transform. Linking a site replaces its stored value with the
//! unconstrained image and adds the log-Jacobian of the inverse map to the
//! cached log-density; unlinking undoes both. Target oracles always see
//! natural values, so all transform math lives here.

/// Bijection between a site's natural domain and the real line, applied
/// elementwise to the site's value vector.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Transform {
    /// Unconstrained variables; the identity map.
    #[default]
    Identity,
    /// Positive reals, mapped via `z = ln(x)`.
    LogPositive,
}

impl Transform {
    /// Maps a natural-space coordinate into unconstrained space.
    pub fn to_unconstrained(&self, x: f64) -> f64 {
        match self {
            Transform::Identity => x,
            Transform::LogPositive => x.ln(),
        }
    }

    /// Inverse of [`Transform::to_unconstrained`].
    pub fn to_natural(&self, z: f64) -> f64 {
        match self {
            Transform::Identity => z,
            Transform::LogPositive => z.exp(),
        }
    }

    /// Log-Jacobian `ln |dx/dz|` of the inverse map, evaluated at the
    /// unconstrained coordinate `z`. This is the correction added to the
    /// log-density when the site is linked.
    pub fn log_jacobian(&self, z: f64) -> f64 {
        match self {
            Transform::Identity => 0.0,
            // x = exp(z), dx/dz = exp(z), so ln|J| = z.
            Transform::LogPositive => z,
        }
    }

    /// Chain rule for the linked-space gradient: given the gradient of the
    /// log-density with respect to the natural coordinate, returns the
    /// gradient of `logp(x(z)) + ln|J(z)|` with respect to `z`.
    pub fn grad_to_unconstrained(&self, z: f64, natural_grad: f64) -> f64 {
        match self {
            Transform::Identity => natural_grad,
            // d/dz [logp(e^z) + z] = logp'(x) * e^z + 1.
            Transform::LogPositive => natural_grad * z.exp() + 1.0,
        }
    }
}
