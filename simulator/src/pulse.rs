use drscope_common::Real;

/// Parametric single-pulse shapes for synthetic events.
#[derive(Debug, Clone, Copy)]
pub(crate) enum PulseShape {
    Gaussian {
        peak_time: Real,
        sd: Real,
        height: Real,
    },
    Biexp {
        start: Real,
        rise: Real,
        decay: Real,
        height: Real,
    },
}

impl PulseShape {
    pub(crate) fn value_at(&self, time: Real) -> Real {
        match *self {
            PulseShape::Gaussian {
                peak_time,
                sd,
                height,
            } => height * f64::exp(-f64::powi((time - peak_time) / sd, 2) / 2.0),
            PulseShape::Biexp {
                start,
                rise,
                decay,
                height,
            } => {
                if time <= start {
                    0.0
                } else {
                    // normalised so the peak sits at `height`; rise != decay
                    let peak_time = (decay / rise).ln() * decay * rise / (decay - rise);
                    let norm = f64::exp(-peak_time / decay) - f64::exp(-peak_time / rise);
                    let elapsed = time - start;
                    height / norm * (f64::exp(-elapsed / decay) - f64::exp(-elapsed / rise))
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_approx_eq::assert_approx_eq;

    #[test]
    fn gaussian_peaks_at_its_mean() {
        let pulse = PulseShape::Gaussian {
            peak_time: 200.0,
            sd: 4.0,
            height: 25.0,
        };
        assert_approx_eq!(pulse.value_at(200.0), 25.0, 1e-12);
        assert!(pulse.value_at(196.0) < 25.0);
        assert!(pulse.value_at(150.0) < 1e-6);
    }

    #[test]
    fn biexp_peaks_at_its_height() {
        let (start, rise, decay, height) = (100.0, 2.0, 15.0, 25.0);
        let pulse = PulseShape::Biexp {
            start,
            rise,
            decay,
            height,
        };
        let peak_time = start + (decay / rise).ln() * decay * rise / (decay - rise);
        assert_approx_eq!(pulse.value_at(peak_time), height, 1e-9);
        assert_eq!(pulse.value_at(start), 0.0);
        assert!(pulse.value_at(peak_time + 1.0) < height);
    }
}
