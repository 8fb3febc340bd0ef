//! 分数换算：任意满分 → 1-7 分制

/// 最低分
pub const MIN_GRADE: f64 = 1.0;
/// 最高分
pub const MAX_GRADE: f64 = 7.0;

/// 将 `[0, scale_max]` 区间的分数线性映射到 `[1, 7]`，保留 `precision` 位小数
///
/// `scale_max <= 0` 时返回最低分；越界分数先钳制再换算。
pub fn rescale(score: f64, scale_max: i32, precision: u32) -> f64 {
    if scale_max <= 0 {
        return MIN_GRADE;
    }
    let max = f64::from(scale_max);
    let score = if score.is_nan() { 0.0 } else { score.clamp(0.0, max) };

    let grade = MIN_GRADE + (score / max) * (MAX_GRADE - MIN_GRADE);
    round_to(grade, precision)
}

/// 0-10 单题分 → 1-7
pub fn rescale_item(score: f64) -> f64 {
    rescale(score, 10, 1)
}

/// 0-100 百分比 → 1-7
pub fn rescale_percentage(percentage: f64) -> f64 {
    rescale(percentage, 100, 1)
}

/// 钳制到 `[1, 7]`
pub fn clamp_grade(grade: f64) -> f64 {
    if grade.is_nan() {
        MIN_GRADE
    } else {
        grade.clamp(MIN_GRADE, MAX_GRADE)
    }
}

pub(crate) fn round_to(value: f64, precision: u32) -> f64 {
    let factor = 10f64.powi(precision as i32);
    (value * factor).round() / factor
}
