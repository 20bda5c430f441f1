//! Register handles and the per-compilation register pool.

use std::collections::BTreeSet;
use std::fmt;

use snafu::ensure;
use strum::Display;

use crate::error::*;
use crate::isa::Isa;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[strum(serialize_all = "lowercase")]
pub enum RegClass {
    Vector,
    General,
}

/// Vector register index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct VecReg(pub u16);

/// General-purpose register index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Gpr(pub u16);

impl fmt::Display for VecReg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "v{}", self.0)
    }
}

impl fmt::Display for Gpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "r{}", self.0)
    }
}

/// Register operand of an emitter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reg {
    Vec(VecReg),
    Gpr(Gpr),
}

impl Reg {
    pub fn class(self) -> RegClass {
        match self {
            Reg::Vec(_) => RegClass::Vector,
            Reg::Gpr(_) => RegClass::General,
        }
    }
}

impl From<VecReg> for Reg {
    fn from(reg: VecReg) -> Self {
        Reg::Vec(reg)
    }
}

impl From<Gpr> for Reg {
    fn from(reg: Gpr) -> Self {
        Reg::Gpr(reg)
    }
}

/// Finite register files of one compilation. Lowest free index is handed out first.
#[derive(Debug, Clone)]
pub struct RegistersPool {
    free_vecs: BTreeSet<u16>,
    free_gprs: BTreeSet<u16>,
    vec_count: usize,
    gpr_count: usize,
}

impl RegistersPool {
    pub fn new(vec_count: usize, gpr_count: usize) -> Self {
        Self {
            free_vecs: (0..vec_count as u16).collect(),
            free_gprs: (0..gpr_count as u16).collect(),
            vec_count,
            gpr_count,
        }
    }

    /// Pool sized for `isa`: all vector registers, data pointers plus scratch GPRs.
    pub fn for_isa(isa: Isa) -> Self {
        Self::new(isa.vec_reg_count(), isa.data_ptr_gpr_count() + isa.aux_gpr_count())
    }

    pub fn vec_count(&self) -> usize {
        self.vec_count
    }

    pub fn gpr_count(&self) -> usize {
        self.gpr_count
    }

    pub fn free_vec_count(&self) -> usize {
        self.free_vecs.len()
    }

    pub fn free_gpr_count(&self) -> usize {
        self.free_gprs.len()
    }

    pub fn acquire_vecs(&mut self, count: usize) -> Result<Vec<VecReg>> {
        let available = self.free_vecs.len();
        ensure!(count <= available, RegisterExhaustedSnafu { class: RegClass::Vector, requested: count, available });
        Ok((0..count).filter_map(|_| self.free_vecs.pop_first()).map(VecReg).collect())
    }

    pub fn acquire_gprs(&mut self, count: usize) -> Result<Vec<Gpr>> {
        let available = self.free_gprs.len();
        ensure!(count <= available, RegisterExhaustedSnafu { class: RegClass::General, requested: count, available });
        Ok((0..count).filter_map(|_| self.free_gprs.pop_first()).map(Gpr).collect())
    }

    pub fn acquire_vec(&mut self) -> Result<VecReg> {
        Ok(self.acquire_vecs(1)?[0])
    }

    pub fn release_vec(&mut self, reg: VecReg) {
        self.free_vecs.insert(reg.0);
    }

    pub fn release_gpr(&mut self, reg: Gpr) {
        self.free_gprs.insert(reg.0);
    }
}
