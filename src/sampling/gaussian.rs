use rand::Rng;

/// Discrete Gaussian over Z centered at 0, tabulated once per σ.
///
/// The table covers [-⌈6σ⌉, ⌈6σ⌉]; mass beyond that is negligible for the
/// σ ≈ 3.2 used by the schemes.
#[derive(Clone, Debug)]
pub struct GaussianSampler {
    cdf: Vec<f64>,
    tail: i64,
}

impl GaussianSampler {
    pub fn new(sigma: f64) -> Self {
        let tail = (6.0 * sigma).ceil() as i64;
        let two_sigma_sq = 2.0 * sigma * sigma;
        let mut cdf = Vec::with_capacity((2 * tail + 1) as usize);
        let mut cumulative = 0.0f64;
        for x in -tail..=tail {
            cumulative += (-((x * x) as f64) / two_sigma_sq).exp();
            cdf.push(cumulative);
        }
        Self { cdf, tail }
    }

    pub fn tail(&self) -> i64 {
        self.tail
    }

    /// Draw one value.
    ///
    /// Every table entry is visited and the result picked with integer masks,
    /// so the scan has no data-dependent branch.
    pub fn sample<R: Rng>(&self, rng: &mut R) -> i64 {
        let total = self.cdf[self.cdf.len() - 1];
        let u: f64 = rng.random::<f64>() * total;

        let mut result = self.tail;
        for (i, &c) in self.cdf.iter().enumerate().rev() {
            let mask = ((u < c) as i64).wrapping_neg();
            let candidate = -self.tail + i as i64;
            result = (candidate & mask) | (result & !mask);
        }
        result
    }

    pub fn sample_poly<R: Rng>(&self, n: usize, rng: &mut R) -> Vec<i64> {
        (0..n).map(|_| self.sample(rng)).collect()
    }
}

/// n independent discrete Gaussian coefficients with deviation σ.
pub fn sample_gaussian<R: Rng>(n: usize, sigma: f64, rng: &mut R) -> Vec<i64> {
    GaussianSampler::new(sigma).sample_poly(n, rng)
}
