//! Owned, resizable complex vectors and matrices.
//!
//! Both containers record the working precision of their entries. Resizing
//! keeps the entries of the common prefix and zero-fills growth at the
//! container's precision; `change_precision` re-rounds every entry.

use super::ComplexScalar;
use nalgebra::DMatrix;
use num_complex::Complex;
use std::ops::{Index, IndexMut};

#[derive(Debug, Clone, PartialEq)]
pub struct Vector<T> {
    data: Vec<T>,
    precision: u32,
}

impl<T: ComplexScalar> Vector<T> {
    pub fn zeros(len: usize, precision: u32) -> Self {
        Self {
            data: vec![T::zero_at(precision); len],
            precision,
        }
    }

    pub fn from_vec(data: Vec<T>, precision: u32) -> Self {
        Self { data, precision }
    }

    pub fn from_c64(values: &[Complex<f64>], precision: u32) -> Self {
        Self {
            data: values.iter().map(|v| T::from_c64_at(*v, precision)).collect(),
            precision,
        }
    }

    pub fn from_source(values: &[rug::Complex], precision: u32) -> Self {
        Self {
            data: values.iter().map(|v| T::from_mp(v, precision)).collect(),
            precision,
        }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn precision(&self) -> u32 {
        self.precision
    }

    pub fn as_slice(&self) -> &[T] {
        &self.data
    }

    pub fn as_mut_slice(&mut self) -> &mut [T] {
        &mut self.data
    }

    pub fn iter(&self) -> std::slice::Iter<'_, T> {
        self.data.iter()
    }

    pub fn to_c64(&self) -> Vec<Complex<f64>> {
        self.data.iter().map(|v| v.to_c64()).collect()
    }

    pub fn into_vec(self) -> Vec<T> {
        self.data
    }

    /// Resizes in place, preserving the first `min(old, new)` entries.
    pub fn resize(&mut self, len: usize) {
        let zero = T::zero_at(self.precision);
        self.data.resize(len, zero);
    }

    pub fn change_precision(&mut self, precision: u32) {
        for v in &mut self.data {
            v.set_precision(precision);
        }
        self.precision = precision;
    }

    pub fn fill_zero(&mut self) {
        for v in &mut self.data {
            *v = T::zero_at(self.precision);
        }
    }

    pub fn copy_from(&mut self, other: &Vector<T>) {
        self.data.clone_from(&other.data);
    }

    pub fn norm(&self) -> f64 {
        super::slice_norm(&self.data)
    }

    pub fn distance(&self, other: &Vector<T>) -> f64 {
        super::slice_distance(&self.data, &other.data)
    }

    /// Bilinear product `sum(a_i * b_i)` without conjugation.
    pub fn dot(&self, other: &Vector<T>) -> T {
        dot(&self.data, &other.data, self.precision)
    }

    pub fn is_finite(&self) -> bool {
        self.data.iter().all(|v| v.is_finite())
    }

    pub fn scaled(&self, factor: f64) -> Vector<T> {
        Vector::from_vec(self.data.iter().map(|v| v.scale(factor)).collect(), self.precision)
    }

    /// Re-expresses the vector in another scalar type at `precision`.
    pub fn convert<U: ComplexScalar>(&self, precision: u32) -> Vector<U> {
        Vector::from_vec(self.data.iter().map(|v| v.convert(precision)).collect(), precision)
    }

    /// `self + factor * other`, with `factor` a real double.
    pub fn axpy(&self, factor: f64, other: &Vector<T>) -> Vector<T> {
        let data = self
            .data
            .iter()
            .zip(&other.data)
            .map(|(a, b)| a.clone() + b.scale(factor))
            .collect();
        Vector::from_vec(data, self.precision)
    }
}

impl<T> Index<usize> for Vector<T> {
    type Output = T;
    fn index(&self, index: usize) -> &T {
        &self.data[index]
    }
}

impl<T> IndexMut<usize> for Vector<T> {
    fn index_mut(&mut self, index: usize) -> &mut T {
        &mut self.data[index]
    }
}

pub(crate) fn dot<T: ComplexScalar>(a: &[T], b: &[T], precision: u32) -> T {
    a.iter()
        .zip(b)
        .fold(T::zero_at(precision), |acc, (x, y)| acc + x.clone() * y.clone())
}

/// Dense row-major matrix.
#[derive(Debug, Clone, PartialEq)]
pub struct Matrix<T> {
    rows: usize,
    cols: usize,
    data: Vec<T>,
    precision: u32,
}

impl<T: ComplexScalar> Matrix<T> {
    pub fn zeros(rows: usize, cols: usize, precision: u32) -> Self {
        Self {
            rows,
            cols,
            data: vec![T::zero_at(precision); rows * cols],
            precision,
        }
    }

    pub fn identity(n: usize, precision: u32) -> Self {
        let mut m = Self::zeros(n, n, precision);
        for i in 0..n {
            m[(i, i)] = T::one_at(precision);
        }
        m
    }

    pub fn from_c64_rows(rows: &[Vec<Complex<f64>>], cols: usize, precision: u32) -> Self {
        let mut m = Self::zeros(rows.len(), cols, precision);
        for (i, row) in rows.iter().enumerate() {
            for (j, v) in row.iter().enumerate().take(cols) {
                m[(i, j)] = T::from_c64_at(*v, precision);
            }
        }
        m
    }

    pub fn from_source_rows(rows: &[Vec<rug::Complex>], cols: usize, precision: u32) -> Self {
        let mut m = Self::zeros(rows.len(), cols, precision);
        for (i, row) in rows.iter().enumerate() {
            for (j, v) in row.iter().enumerate().take(cols) {
                m[(i, j)] = T::from_mp(v, precision);
            }
        }
        m
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    pub fn precision(&self) -> u32 {
        self.precision
    }

    pub fn row(&self, i: usize) -> &[T] {
        &self.data[i * self.cols..(i + 1) * self.cols]
    }

    pub fn row_mut(&mut self, i: usize) -> &mut [T] {
        let cols = self.cols;
        &mut self.data[i * cols..(i + 1) * cols]
    }

    pub fn set_row(&mut self, i: usize, values: &[T]) {
        self.row_mut(i).clone_from_slice(values);
    }

    /// Resizes in place. Entries `(i, j)` with `i < min(rows)` and
    /// `j < min(cols)` keep their values; new entries are zero.
    pub fn resize(&mut self, rows: usize, cols: usize) {
        if rows == self.rows && cols == self.cols {
            return;
        }
        let mut data = vec![T::zero_at(self.precision); rows * cols];
        for i in 0..rows.min(self.rows) {
            for j in 0..cols.min(self.cols) {
                data[i * cols + j] = self.data[i * self.cols + j].clone();
            }
        }
        self.data = data;
        self.rows = rows;
        self.cols = cols;
    }

    pub fn change_precision(&mut self, precision: u32) {
        for v in &mut self.data {
            v.set_precision(precision);
        }
        self.precision = precision;
    }

    pub fn is_finite(&self) -> bool {
        self.data.iter().all(|v| v.is_finite())
    }

    pub fn mul_vec(&self, x: &Vector<T>) -> Vector<T> {
        let mut out = Vector::zeros(self.rows, self.precision);
        self.mul_vec_into(x, &mut out);
        out
    }

    /// `out = self * x`. `out` is resized to the row count.
    pub fn mul_vec_into(&self, x: &Vector<T>, out: &mut Vector<T>) {
        out.resize(self.rows);
        for i in 0..self.rows {
            out[i] = dot(self.row(i), x.as_slice(), self.precision);
        }
    }

    pub fn mul_mat(&self, other: &Matrix<T>) -> Matrix<T> {
        let mut out = Matrix::zeros(self.rows, other.cols, self.precision);
        self.mul_mat_into(other, &mut out);
        out
    }

    /// `out = self * other`. `out` is resized to fit.
    pub fn mul_mat_into(&self, other: &Matrix<T>, out: &mut Matrix<T>) {
        out.resize(self.rows, other.cols);
        for i in 0..self.rows {
            for j in 0..other.cols {
                let mut acc = T::zero_at(self.precision);
                for k in 0..self.cols {
                    acc = acc + self[(i, k)].clone() * other[(k, j)].clone();
                }
                out[(i, j)] = acc;
            }
        }
    }

    pub fn lu(&self) -> LuDecomposition<T> {
        LuDecomposition::new(self)
    }

    pub fn determinant(&self) -> T {
        self.lu().determinant()
    }

    /// Ratio of extreme singular values, computed in double.
    pub fn condition_number(&self) -> f64 {
        let m = DMatrix::from_fn(self.rows, self.cols, |i, j| self[(i, j)].to_c64());
        if !m.iter().all(|z| z.re.is_finite() && z.im.is_finite()) {
            return f64::INFINITY;
        }
        let sv = m.singular_values();
        let max = sv.iter().cloned().fold(0.0_f64, f64::max);
        let min = sv.iter().cloned().fold(f64::INFINITY, f64::min);
        if min == 0.0 {
            f64::INFINITY
        } else {
            max / min
        }
    }
}

impl<T> Index<(usize, usize)> for Matrix<T> {
    type Output = T;
    fn index(&self, (i, j): (usize, usize)) -> &T {
        &self.data[i * self.cols + j]
    }
}

impl<T> IndexMut<(usize, usize)> for Matrix<T> {
    fn index_mut(&mut self, (i, j): (usize, usize)) -> &mut T {
        &mut self.data[i * self.cols + j]
    }
}

/// LU factorisation with partial pivoting by modulus.
///
/// A pivot that is exactly zero or non-finite marks the matrix singular;
/// nothing else does. The ratio of the largest to the smallest pivot modulus
/// serves as a cheap condition estimate.
#[derive(Debug, Clone)]
pub struct LuDecomposition<T> {
    lu: Matrix<T>,
    perm: Vec<usize>,
    swaps: usize,
    singular: bool,
    max_pivot: f64,
    min_pivot: f64,
}

impl<T: ComplexScalar> LuDecomposition<T> {
    fn new(matrix: &Matrix<T>) -> Self {
        debug_assert_eq!(matrix.rows, matrix.cols, "LU requires a square matrix");
        let n = matrix.rows;
        let mut lu = matrix.clone();
        let mut perm: Vec<usize> = (0..n).collect();
        let mut swaps = 0;
        let mut singular = false;
        let mut max_pivot = 0.0_f64;
        let mut min_pivot = f64::INFINITY;

        for k in 0..n {
            let mut p = k;
            let mut best = lu[(k, k)].norm();
            for i in (k + 1)..n {
                let candidate = lu[(i, k)].norm();
                if candidate > best {
                    best = candidate;
                    p = i;
                }
            }
            if lu[(p, k)].is_exact_zero() || !lu[(p, k)].is_finite() {
                singular = true;
                min_pivot = 0.0;
                break;
            }
            if p != k {
                for j in 0..n {
                    lu.data.swap(k * n + j, p * n + j);
                }
                perm.swap(k, p);
                swaps += 1;
            }
            max_pivot = max_pivot.max(best);
            min_pivot = min_pivot.min(best);

            let pivot = lu[(k, k)].clone();
            for i in (k + 1)..n {
                let factor = lu[(i, k)].clone() / pivot.clone();
                for j in (k + 1)..n {
                    let updated = lu[(i, j)].clone() - factor.clone() * lu[(k, j)].clone();
                    lu[(i, j)] = updated;
                }
                lu[(i, k)] = factor;
            }
        }

        Self {
            lu,
            perm,
            swaps,
            singular,
            max_pivot,
            min_pivot,
        }
    }

    pub fn is_singular(&self) -> bool {
        self.singular
    }

    /// Largest over smallest pivot modulus; infinite when singular.
    pub fn pivot_ratio(&self) -> f64 {
        if self.singular || self.min_pivot == 0.0 {
            f64::INFINITY
        } else {
            self.max_pivot / self.min_pivot
        }
    }

    pub fn determinant(&self) -> T {
        let precision = self.lu.precision;
        if self.singular {
            return T::zero_at(precision);
        }
        let mut det = T::one_at(precision);
        for k in 0..self.lu.rows {
            det = det * self.lu[(k, k)].clone();
        }
        if self.swaps % 2 == 1 {
            -det
        } else {
            det
        }
    }

    /// Solves `A x = b`. `None` when the factorisation is singular.
    pub fn solve(&self, b: &Vector<T>) -> Option<Vector<T>> {
        if self.singular {
            return None;
        }
        let n = self.lu.rows;
        let precision = self.lu.precision;
        let mut y: Vec<T> = self.perm.iter().map(|&p| b[p].clone()).collect();

        for i in 0..n {
            let mut acc = y[i].clone();
            for j in 0..i {
                acc = acc - self.lu[(i, j)].clone() * y[j].clone();
            }
            y[i] = acc;
        }
        for i in (0..n).rev() {
            let mut acc = y[i].clone();
            for j in (i + 1)..n {
                acc = acc - self.lu[(i, j)].clone() * y[j].clone();
            }
            y[i] = acc / self.lu[(i, i)].clone();
        }
        Some(Vector::from_vec(y, precision))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::numeric::MpComplex;

    fn c(re: f64, im: f64) -> Complex<f64> {
        Complex::new(re, im)
    }

    #[test]
    fn vector_resize_preserves_prefix_and_zero_fills() {
        let mut v = Vector::<Complex<f64>>::from_c64(&[c(1.0, 0.0), c(2.0, 1.0)], 53);
        v.resize(4);
        assert_eq!(v.to_c64(), vec![c(1.0, 0.0), c(2.0, 1.0), c(0.0, 0.0), c(0.0, 0.0)]);
        v.resize(1);
        assert_eq!(v.to_c64(), vec![c(1.0, 0.0)]);
    }

    #[test]
    fn matrix_resize_keeps_common_block() {
        let rows = vec![vec![c(1.0, 0.0), c(2.0, 0.0)], vec![c(3.0, 0.0), c(4.0, 0.0)]];
        let mut m = Matrix::<Complex<f64>>::from_c64_rows(&rows, 2, 53);
        m.resize(3, 1);
        assert_eq!(m[(0, 0)], c(1.0, 0.0));
        assert_eq!(m[(1, 0)], c(3.0, 0.0));
        assert_eq!(m[(2, 0)], c(0.0, 0.0));
        m.resize(3, 3);
        assert_eq!(m[(1, 0)], c(3.0, 0.0));
        assert_eq!(m[(1, 1)], c(0.0, 0.0));
    }

    #[test]
    fn determinant_and_solve_agree_with_hand_computation() {
        let rows = vec![
            vec![c(0.0, 0.0), c(2.0, 0.0), c(1.0, 0.0)],
            vec![c(1.0, 0.0), c(0.0, 1.0), c(0.0, 0.0)],
            vec![c(3.0, 0.0), c(0.0, 0.0), c(1.0, 0.0)],
        ];
        let m = Matrix::<Complex<f64>>::from_c64_rows(&rows, 3, 53);
        // det = 0*(i*1 - 0) - 2*(1*1 - 0) + 1*(0 - 3i) = -2 - 3i
        let det = m.determinant();
        assert!((det - c(-2.0, -3.0)).norm() < 1e-14);

        let x = Vector::from_c64(&[c(1.0, 1.0), c(-1.0, 0.0), c(0.5, 0.0)], 53);
        let b = m.mul_vec(&x);
        let solved = m.lu().solve(&b).expect("regular matrix");
        assert!(solved.distance(&x) < 1e-14);
    }

    #[test]
    fn exact_zero_row_is_singular() {
        let rows = vec![vec![c(1.0, 0.0), c(2.0, 0.0)], vec![c(0.0, 0.0), c(0.0, 0.0)]];
        let m = Matrix::<Complex<f64>>::from_c64_rows(&rows, 2, 53);
        let lu = m.lu();
        assert!(lu.is_singular());
        assert!(lu.solve(&Vector::zeros(2, 53)).is_none());
        assert!(lu.pivot_ratio().is_infinite());
        assert_eq!(m.determinant(), c(0.0, 0.0));
    }

    #[test]
    fn multiprecision_determinant_matches_double() {
        let rows = vec![
            vec![c(2.0, 1.0), c(-1.0, 0.5)],
            vec![c(0.25, 0.0), c(3.0, -2.0)],
        ];
        let md = Matrix::<Complex<f64>>::from_c64_rows(&rows, 2, 53);
        let mut mm = Matrix::<MpComplex>::from_c64_rows(&rows, 2, 160);
        let expected = md.determinant();
        assert!((mm.determinant().to_c64() - expected).norm() < 1e-14);
        mm.change_precision(64);
        assert_eq!(mm.precision(), 64);
        assert!((mm.determinant().to_c64() - expected).norm() < 1e-14);
    }

    #[test]
    fn condition_number_of_scaled_identity_is_one() {
        let mut m = Matrix::<Complex<f64>>::identity(3, 53);
        m[(1, 1)] = c(0.0, 5.0);
        m[(0, 0)] = c(5.0, 0.0);
        m[(2, 2)] = c(-5.0, 0.0);
        assert!((m.condition_number() - 1.0).abs() < 1e-12);
    }
}
