use ark_bn254::Fr;
use ark_ff::{Field, MontFp, One, Zero};
use num_bigint::BigUint;

/// Twisted Edwards coefficients of Baby Jubjub, `a·x² + y² = 1 + d·x²·y²`.
pub const A: Fr = MontFp!("168700");
pub const D: Fr = MontFp!("168696");

/// Generator of the prime order subgroup.
pub const BASE8: Point = Point {
    x: MontFp!("5299619240641551281634865583518297030282874472190772894086521144482721001553"),
    y: MontFp!("16950150798460657717958625567821834550301663161624707787222815936182638968203"),
};

/// Big-endian bytes of the order of the subgroup generated by `BASE8`.
const SUBORDER_BE: [u8; 32] = [
    6, 12, 137, 206, 92, 38, 52, 5, 55, 10, 8, 182, 208, 48, 43, 11, 171, 62, 237, 184, 57, 32,
    238, 10, 103, 114, 151, 220, 57, 33, 38, 241,
];

pub fn suborder() -> BigUint
{
    BigUint::from_bytes_be(&SUBORDER_BE)
}

#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub struct Point
{
    pub x: Fr,
    pub y: Fr,
}

/// Extended coordinates, `(X:Y:Z)` with `x = X/Z`, `y = Y/Z`.
#[derive(Clone, Copy)]
struct Projective
{
    x: Fr,
    y: Fr,
    z: Fr,
}

impl Projective
{
    fn identity() -> Self
    {
        Projective { x: Fr::zero(), y: Fr::one(), z: Fr::one() }
    }

    fn add(&self, other: &Projective) -> Projective
    {
        let a = self.z * other.z;
        let b = a.square();
        let c = self.x * other.x;
        let d = self.y * other.y;
        let e = D * c * d;
        let f = b - e;
        let g = b + e;

        Projective {
            x: a * f * ((self.x + self.y) * (other.x + other.y) - c - d),
            y: a * g * (d - A * c),
            z: f * g,
        }
    }

    fn affine(&self) -> Point
    {
        let z_inv = self.z.inverse().unwrap_or(Fr::zero());
        Point { x: self.x * z_inv, y: self.y * z_inv }
    }
}

impl Point
{
    pub fn identity() -> Point
    {
        Point { x: Fr::zero(), y: Fr::one() }
    }

    fn projective(&self) -> Projective
    {
        Projective { x: self.x, y: self.y, z: Fr::one() }
    }

    pub fn add(&self, other: &Point) -> Point
    {
        self.projective().add(&other.projective()).affine()
    }

    /// Double-and-add scalar multiplication, least significant bit first.
    pub fn mul_scalar(&self, scalar: &BigUint) -> Point
    {
        let mut result = Projective::identity();
        let mut exp = self.projective();

        for byte in scalar.to_bytes_le()
        {
            for bit in 0..8
            {
                if (byte >> bit) & 1 == 1
                {
                    result = result.add(&exp);
                }
                exp = exp.add(&exp);
            }
        }

        result.affine()
    }

    pub fn in_curve(&self) -> bool
    {
        let x2 = self.x.square();
        let y2 = self.y.square();
        A * x2 + y2 == Fr::one() + D * x2 * y2
    }
}
