//! Hardware capability profiles.
//!
//! A profile fixes the vector width and register file a kernel is generated for.
//! Support is decided once per process by probing the host CPU.

use std::sync::OnceLock;

use strum::{Display, EnumIter, EnumString, IntoEnumIterator, IntoStaticStr};
use weld_ir::ElementType;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[derive(Display, EnumIter, EnumString, IntoStaticStr)]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum Isa {
    Sse41,
    Avx2,
    Avx512Core,
    Asimd,
}

impl Isa {
    /// Vector register width in bytes.
    pub const fn vlen(self) -> usize {
        match self {
            Isa::Sse41 | Isa::Asimd => 16,
            Isa::Avx2 => 32,
            Isa::Avx512Core => 64,
        }
    }

    pub const fn vec_reg_count(self) -> usize {
        match self {
            Isa::Sse41 | Isa::Avx2 => 16,
            Isa::Avx512Core | Isa::Asimd => 32,
        }
    }

    /// General-purpose registers available for data pointers.
    pub const fn data_ptr_gpr_count(self) -> usize {
        match self {
            Isa::Sse41 | Isa::Avx2 | Isa::Avx512Core => 11,
            Isa::Asimd => 23,
        }
    }

    /// Scratch GPRs emitters may borrow on top of the data pointers.
    pub const fn aux_gpr_count(self) -> usize {
        match self {
            Isa::Sse41 | Isa::Avx2 | Isa::Avx512Core => 4,
            Isa::Asimd => 6,
        }
    }

    /// Elements of `element_type` held by one vector register.
    pub const fn lanes(self, element_type: ElementType) -> usize {
        self.vlen() / element_type.bytes()
    }

    pub fn is_supported(self) -> bool {
        host().contains(&self)
    }

    /// Profiles the host supports, widest first.
    pub fn dispatch_table() -> Vec<Isa> {
        let mut table: Vec<Isa> = Isa::iter().filter(|isa| isa.is_supported()).collect();
        table.sort_by_key(|isa| std::cmp::Reverse(isa.vlen()));
        table
    }
}

fn host() -> &'static [Isa] {
    static HOST: OnceLock<Vec<Isa>> = OnceLock::new();
    HOST.get_or_init(|| {
        let detected = probe();
        tracing::debug!(isas = ?detected, "host capabilities probed");
        detected
    })
}

#[cfg(target_arch = "x86_64")]
fn probe() -> Vec<Isa> {
    let mut isas = Vec::new();
    if std::arch::is_x86_feature_detected!("sse4.1") {
        isas.push(Isa::Sse41);
    }
    if std::arch::is_x86_feature_detected!("avx2") {
        isas.push(Isa::Avx2);
    }
    if std::arch::is_x86_feature_detected!("avx512f")
        && std::arch::is_x86_feature_detected!("avx512bw")
        && std::arch::is_x86_feature_detected!("avx512vl")
        && std::arch::is_x86_feature_detected!("avx512dq")
    {
        isas.push(Isa::Avx512Core);
    }
    isas
}

#[cfg(target_arch = "aarch64")]
fn probe() -> Vec<Isa> {
    if std::arch::is_aarch64_feature_detected!("neon") { vec![Isa::Asimd] } else { Vec::new() }
}

#[cfg(not(any(target_arch = "x86_64", target_arch = "aarch64")))]
fn probe() -> Vec<Isa> {
    Vec::new()
}
