/// Barrett reduction of a 128-bit value modulo `m`.
///
/// `barrett_k = floor(2^64 / m)`. The single-word trick is exact for moduli
/// up to 2^32; wider moduli take the u128 remainder.
#[inline(always)]
pub fn barrett_reduce(a: u128, m: u64, barrett_k: u64) -> u64 {
    if m > (1u64 << 32) {
        (a % m as u128) as u64
    } else {
        let q_hat = ((a * barrett_k as u128) >> 64) as u64;
        let r = (a as u64).wrapping_sub(q_hat.wrapping_mul(m));
        if r >= m { r.wrapping_sub(m) } else { r }
    }
}

/// floor(2^64 / m)
#[inline]
pub fn barrett_constant(m: u64) -> u64 {
    debug_assert!(m > 1, "modulus must be > 1");
    ((1u128 << 64) / m as u128) as u64
}

/// (a + b) mod m for a, b < m
#[inline(always)]
pub fn mod_add(a: u64, b: u64, m: u64) -> u64 {
    let sum = a as u128 + b as u128;
    if sum >= m as u128 { (sum - m as u128) as u64 } else { sum as u64 }
}

/// (a - b) mod m for a, b < m
#[inline(always)]
pub fn mod_sub(a: u64, b: u64, m: u64) -> u64 {
    if a >= b { a - b } else { m - b + a }
}

#[inline(always)]
pub fn mod_neg(a: u64, m: u64) -> u64 {
    if a == 0 { 0 } else { m - a }
}

#[inline(always)]
pub fn mod_mul(a: u64, b: u64, m: u64, barrett_k: u64) -> u64 {
    barrett_reduce(a as u128 * b as u128, m, barrett_k)
}

/// a^exp mod m
pub fn mod_pow(mut base: u64, mut exp: u64, m: u64) -> u64 {
    let bk = barrett_constant(m);
    let mut result = 1u64 % m;
    base %= m;
    while exp > 0 {
        if exp & 1 == 1 {
            result = mod_mul(result, base, m, bk);
        }
        exp >>= 1;
        base = mod_mul(base, base, m, bk);
    }
    result
}

/// a^{-1} mod m via extended Euclid; `None` when gcd(a, m) != 1.
pub fn mod_inv(a: u64, m: u64) -> Option<u64> {
    let (mut old_r, mut r) = (a as i128 % m as i128, m as i128);
    let (mut old_s, mut s) = (1i128, 0i128);

    while r != 0 {
        let q = old_r / r;
        (old_r, r) = (r, old_r - q * r);
        (old_s, s) = (s, old_s - q * s);
    }

    if old_r != 1 {
        return None;
    }
    Some(old_s.rem_euclid(m as i128) as u64)
}

/// Residue of a signed integer in [0, m).
#[inline(always)]
pub fn reduce_signed(v: i64, m: u64) -> u64 {
    (v as i128).rem_euclid(m as i128) as u64
}

/// Residue of a signed 128-bit integer in [0, m).
#[inline(always)]
pub fn reduce_i128(v: i128, m: u64) -> u64 {
    v.rem_euclid(m as i128) as u64
}

/// Centered representative of `a mod m` in (-m/2, m/2].
#[inline(always)]
pub fn center(a: u64, m: u64) -> i64 {
    if a > m / 2 { a as i64 - m as i64 } else { a as i64 }
}

/// Deterministic Miller-Rabin for 64-bit integers.
///
/// The witness set {2, 3, ..., 37} is exact for every n < 3.3 * 10^24.
pub fn is_prime(n: u64) -> bool {
    const WITNESSES: [u64; 12] = [2, 3, 5, 7, 11, 13, 17, 19, 23, 29, 31, 37];
    if n < 2 {
        return false;
    }
    for &p in &WITNESSES {
        if n % p == 0 {
            return n == p;
        }
    }

    let mut d = n - 1;
    let mut r = 0u32;
    while d % 2 == 0 {
        d /= 2;
        r += 1;
    }

    let bk = barrett_constant(n);
    'witness: for &a in &WITNESSES {
        let mut x = mod_pow(a, d, n);
        if x == 1 || x == n - 1 {
            continue;
        }
        for _ in 1..r {
            x = mod_mul(x, x, n, bk);
            if x == n - 1 {
                continue 'witness;
            }
        }
        return false;
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_barrett_reduce_small_and_wide() {
        let m = 65537u64;
        let bk = barrett_constant(m);
        assert_eq!(barrett_reduce(0, m, bk), 0);
        assert_eq!(barrett_reduce(m as u128 + 1, m, bk), 1);
        assert_eq!(barrett_reduce(123456789u128, m, bk), (123456789u128 % m as u128) as u64);

        let wide = 1152921504606830593u64;
        let bk = barrett_constant(wide);
        let a = (wide as u128 - 1) * (wide as u128 - 2);
        assert_eq!(barrett_reduce(a, wide, bk), (a % wide as u128) as u64);
    }

    #[test]
    fn test_mod_add_sub_neg() {
        let m = 65537u64;
        assert_eq!(mod_add(m - 1, 2, m), 1);
        assert_eq!(mod_sub(100, 200, m), m - 100);
        assert_eq!(mod_add(100, mod_neg(100, m), m), 0);
        assert_eq!(mod_neg(0, m), 0);
    }

    #[test]
    fn test_mod_pow_and_inv() {
        let m = 65537u64;
        let bk = barrett_constant(m);
        assert_eq!(mod_pow(2, 16, m), 65536);
        assert_eq!(mod_pow(3, 0, m), 1);
        let inv = mod_inv(12345, m).unwrap();
        assert_eq!(mod_mul(12345, inv, m, bk), 1);
        assert!(mod_inv(6, 9).is_none());
    }

    #[test]
    fn test_signed_helpers() {
        assert_eq!(reduce_signed(-1, 17), 16);
        assert_eq!(reduce_signed(35, 17), 1);
        assert_eq!(reduce_i128(-35, 17), 16);
        assert_eq!(center(16, 17), -1);
        assert_eq!(center(8, 17), 8);
        assert_eq!(center(9, 17), -8);
    }

    #[test]
    fn test_is_prime() {
        assert!(is_prime(2));
        assert!(is_prime(65537));
        assert!(is_prime(1032193));
        assert!(is_prime(786433));
        assert!(is_prime(1152921504606830593));
        assert!(!is_prime(1));
        assert!(!is_prime(65535));
        // Carmichael number
        assert!(!is_prime(561));
        assert!(!is_prime(1152921504606830591));
    }
}
