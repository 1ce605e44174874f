//! int16 logistic and tanh.
//!
//! Inputs are Q3.12 (range [-8, 8)) when the multiplier is zero, outputs are
//! Q0.15. Both functions interpolate a 256-entry sigmoid table sampled at
//! `i / 24`; tanh uses `tanh(x) = 2 * sigmoid(2x) - 1`. Scaling the input by 3
//! (3/4 of the 2^2 needed to map Q3.12 onto the table step) widens the covered
//! range to about [-10.7, 10.7] for logistic.

use std::sync::OnceLock;

const TABLE_LEN: usize = 256;

fn sigmoid_table() -> &'static [u16; TABLE_LEN] {
    static TABLE: OnceLock<[u16; TABLE_LEN]> = OnceLock::new();
    TABLE.get_or_init(|| {
        let mut table = [0u16; TABLE_LEN];
        for (i, v) in table.iter_mut().enumerate() {
            let x = i as f64 / 24.0;
            let s = 1.0 / (1.0 + (-x).exp());
            *v = (65536.0 * s).round().min(65535.0) as u16;
        }
        table
    })
}

/// Resolves the power-of-two convention: a zero multiplier means "3 << left_shift".
#[inline]
fn input_scaling(input_multiplier: i32, input_left_shift: i32) -> (i64, u32, i64) {
    debug_assert!(input_left_shift >= 0, "negative input shift {}", input_left_shift);
    let shift = input_left_shift.clamp(0, 40) as u32;
    if input_multiplier == 0 {
        (3i64 << shift, 0, 0)
    } else {
        let round = if shift > 0 { 1i64 << (shift - 1) } else { 0 };
        (input_multiplier as i64, shift, round)
    }
}

#[inline]
fn interpolate(table: &[u16; TABLE_LEN], abs: u64, frac_bits: u32, saturated: u64) -> u64 {
    let uh = (abs >> frac_bits) as usize;
    if uh >= TABLE_LEN - 1 {
        return saturated;
    }
    let ua = table[uh] as u64;
    let ub = table[uh + 1] as u64;
    let ut = abs & ((1u64 << frac_bits) - 1);
    (ua << frac_bits) + ut * (ub - ua)
}

#[inline]
fn logistic_one(table: &[u16; TABLE_LEN], x: i64) -> i16 {
    let result = interpolate(table, x.unsigned_abs(), 9, 0x7FFF << 10);
    let result = if x >= 0 { result + (1 << 9) } else { (1 << 25) - result + (1 << 9) - 1 };
    (result >> 10) as i16
}

#[inline]
fn tanh_one(table: &[u16; TABLE_LEN], x: i64) -> i16 {
    let result = interpolate(table, x.unsigned_abs(), 8, 0xFFFF << 8) as i64;
    let result = if x >= 0 { result - (1 << 23) + (1 << 7) } else { -result + (1 << 23) + (1 << 7) - 1 };
    (result >> 8) as i16
}

pub fn logistic(input_multiplier: i32, input_left_shift: i32, input: &[i16], output: &mut [i16]) {
    debug_assert_eq!(input.len(), output.len());
    let table = sigmoid_table();
    let (mult, shift, round) = input_scaling(input_multiplier, input_left_shift);
    for (o, &x) in output.iter_mut().zip(input) {
        *o = logistic_one(table, (x as i64 * mult + round) >> shift);
    }
}

pub fn logistic_in_place(input_multiplier: i32, input_left_shift: i32, data: &mut [i16]) {
    let table = sigmoid_table();
    let (mult, shift, round) = input_scaling(input_multiplier, input_left_shift);
    for v in data.iter_mut() {
        *v = logistic_one(table, (*v as i64 * mult + round) >> shift);
    }
}

pub fn tanh(input_multiplier: i32, input_left_shift: i32, input: &[i16], output: &mut [i16]) {
    debug_assert_eq!(input.len(), output.len());
    let table = sigmoid_table();
    let (mult, shift, round) = input_scaling(input_multiplier, input_left_shift);
    for (o, &x) in output.iter_mut().zip(input) {
        *o = tanh_one(table, (x as i64 * mult + round) >> shift);
    }
}

pub fn tanh_in_place(input_multiplier: i32, input_left_shift: i32, data: &mut [i16]) {
    let table = sigmoid_table();
    let (mult, shift, round) = input_scaling(input_multiplier, input_left_shift);
    for v in data.iter_mut() {
        *v = tanh_one(table, (*v as i64 * mult + round) >> shift);
    }
}
