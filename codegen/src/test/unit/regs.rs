use crate::error::Error;
use crate::isa::Isa;
use crate::regs::*;

#[test]
fn test_lowest_index_first() {
    let mut pool = RegistersPool::new(4, 2);
    assert_eq!(pool.acquire_vecs(2).unwrap(), vec![VecReg(0), VecReg(1)]);
    pool.release_vec(VecReg(0));
    assert_eq!(pool.acquire_vec().unwrap(), VecReg(0));
    assert_eq!(pool.acquire_vec().unwrap(), VecReg(2));
    assert_eq!(pool.free_vec_count(), 1);
    assert_eq!(pool.acquire_gprs(2).unwrap(), vec![Gpr(0), Gpr(1)]);
}

#[test]
fn test_exhaustion_leaves_pool_intact() {
    let mut pool = RegistersPool::new(2, 1);
    let err = pool.acquire_vecs(3).unwrap_err();
    assert!(
        matches!(err, Error::RegisterExhausted { class: RegClass::Vector, requested: 3, available: 2 }),
        "{err}"
    );
    assert_eq!(pool.free_vec_count(), 2);

    pool.acquire_gprs(1).unwrap();
    let err = pool.acquire_gprs(1).unwrap_err();
    assert!(matches!(err, Error::RegisterExhausted { class: RegClass::General, available: 0, .. }));
}

#[test]
fn test_pool_for_isa() {
    let pool = RegistersPool::for_isa(Isa::Sse41);
    assert_eq!(pool.vec_count(), 16);
    assert_eq!(pool.gpr_count(), 15);

    let pool = RegistersPool::for_isa(Isa::Asimd);
    assert_eq!(pool.vec_count(), 32);
    assert_eq!(pool.gpr_count(), 29);
}

#[test]
fn test_register_display() {
    assert_eq!(VecReg(3).to_string(), "v3");
    assert_eq!(Gpr(12).to_string(), "r12");
    assert_eq!(Reg::from(Gpr(1)).class(), RegClass::General);
    assert_eq!(RegClass::Vector.to_string(), "vector");
}
