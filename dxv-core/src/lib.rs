pub mod document;
pub mod geometry;
pub mod spatial;
pub mod tessellate;

/// 分级容差。不同用途的"近似相等"不能共用同一个阈值。
pub mod tolerance {
    /// 退化判定：平行、零长度、相切等数值边界。
    pub const DEGENERACY: f64 = 1e-10;
    /// 重复顶点判定。
    pub const DUPLICATE_VERTEX: f64 = 1e-6;
    /// 交互层面（捕捉合并、闭合判定）使用的世界坐标容差。
    pub const INTERACTION: f64 = 1e-3;

    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub enum Tier {
        Degeneracy,
        DuplicateVertex,
        Interaction,
    }

    impl Tier {
        #[inline]
        pub fn value(self) -> f64 {
            match self {
                Tier::Degeneracy => DEGENERACY,
                Tier::DuplicateVertex => DUPLICATE_VERTEX,
                Tier::Interaction => INTERACTION,
            }
        }
    }

    #[inline]
    pub fn approx_eq(a: f64, b: f64, tier: Tier) -> bool {
        (a - b).abs() <= tier.value()
    }

    #[inline]
    pub fn is_zero(value: f64, tier: Tier) -> bool {
        value.abs() <= tier.value()
    }

}
