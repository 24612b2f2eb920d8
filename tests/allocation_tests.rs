//! Allocator wrapper, standalone frees and configuration.

use carray::carray_mem::allocation::{allocate, allocate_zeroed, array_alloc, array_data_alloc};
use carray::{
    Allocator, ArrayFlags, ArrayStore, Descriptor, Error, GcConfig, GcTrace, StridedConstructor,
    SystemAllocator,
};

#[test]
fn test_allocate_zeroed_exact_and_zero() {
    let alloc = SystemAllocator::new();
    let buf = allocate_zeroed(&alloc, 12, 8).expect("zeroed alloc failed");
    assert_eq!(buf.len(), 96);
    assert!(buf.iter().all(|b| *b == 0));
    alloc.free(buf);
    assert_eq!(alloc.live_bytes(), 0);
}

#[test]
fn test_allocate_exact_size() {
    let alloc = SystemAllocator::new();
    let buf = allocate(&alloc, 3, 5).expect("alloc failed");
    assert_eq!(buf.len(), 15);
    assert_eq!(alloc.stats().allocations, 1);
    assert_eq!(alloc.stats().peak_bytes, 15);
}

#[test]
fn test_allocation_failure_is_reported_not_partial() {
    let alloc = SystemAllocator::with_cap(100);
    assert!(matches!(
        allocate(&alloc, 26, 4),
        Err(Error::AllocFailed { bytes: 104, .. })
    ));
    assert!(matches!(
        allocate_zeroed(&alloc, usize::MAX / 2, 3),
        Err(Error::AllocFailed { .. })
    ));
    assert_eq!(alloc.live_bytes(), 0);
    assert_eq!(alloc.stats().allocations, 0);
}

#[test]
fn test_create_over_cap_registers_nothing() {
    let cfg = GcConfig {
        mem_cap_bytes: Some(64),
        ..Default::default()
    };
    let mut store = ArrayStore::from_config(&cfg).unwrap();
    let d = Descriptor::new(8, 16, 'd', "<f8");
    let weak = d.downgrade();
    assert!(matches!(
        store.create(d, &[16], false),
        Err(Error::AllocFailed { .. })
    ));
    assert!(store.is_empty());
    assert!(!weak.is_alive());
}

#[test]
fn test_standalone_decref_releases_everything_below_threshold() {
    let alloc = SystemAllocator::new();
    let d = Descriptor::new(4, 6, 'i', "<i4");
    let a = array_alloc(&StridedConstructor, &alloc, d, 2, &[2, 3], false, None).unwrap();
    assert_eq!(alloc.live_bytes(), 24);
    assert!(a.decref(&alloc).unwrap().is_none());
    assert_eq!(alloc.live_bytes(), 0);
    assert_eq!(alloc.stats().frees, 1);
}

#[test]
fn test_standalone_decref_hands_back_shared_data() {
    let alloc = SystemAllocator::new();
    let d = Descriptor::new(4, 6, 'i', "<i4");
    let a = array_alloc(&StridedConstructor, &alloc, d, 1, &[6], false, None).unwrap();
    a.incref();
    let kept = a.decref(&alloc).unwrap().expect("holder keeps the data");
    assert_eq!(kept.len(), 24);
    assert_eq!(alloc.stats().frees, 0);
    alloc.free(kept);
    assert_eq!(alloc.live_bytes(), 0);
}

#[test]
fn test_array_alloc_layouts() {
    let alloc = SystemAllocator::new();
    let c = array_alloc(
        &StridedConstructor,
        &alloc,
        Descriptor::new(2, 24, 'h', "<i2"),
        3,
        &[2, 3, 4],
        false,
        None,
    )
    .unwrap();
    assert_eq!(c.strides(), Some(&[24isize, 8, 2][..]));
    assert!(c.flags().contains(ArrayFlags::C_CONTIGUOUS | ArrayFlags::OWNDATA));

    let f = array_alloc(
        &StridedConstructor,
        &alloc,
        Descriptor::new(2, 24, 'h', "<i2"),
        3,
        &[2, 3, 4],
        true,
        None,
    )
    .unwrap();
    assert_eq!(f.strides(), Some(&[2isize, 4, 12][..]));
    assert!(f.flags().contains(ArrayFlags::F_CONTIGUOUS));
    assert_eq!(f.owned_bytes().map(<[u8]>::len), Some(48));
}

#[test]
fn test_array_data_alloc_requires_empty_owner() {
    let alloc = SystemAllocator::new();
    let mut a = array_alloc(
        &StridedConstructor,
        &alloc,
        Descriptor::new(4, 10, 'i', "<i4"),
        1,
        &[10],
        false,
        None,
    )
    .unwrap();
    assert!(matches!(
        array_data_alloc(&alloc, &mut a),
        Err(Error::Invariant(_))
    ));
}

#[test]
fn test_debug_config_enables_trace() {
    let cfg = GcConfig {
        debug: true,
        ..Default::default()
    };
    let store = ArrayStore::from_config(&cfg).unwrap();
    assert!(store.trace().is_enabled());
    assert!(matches!(store.trace(), GcTrace::Log));
}

#[test]
fn test_free_report_serializes() {
    let mut store = ArrayStore::new();
    let a = store
        .create(Descriptor::new(1, 4, 'b', "|u1"), &[4], false)
        .unwrap();
    let report = store.free(a).unwrap();
    let json = serde_json::to_value(&report).unwrap();
    assert_eq!(json["kind"], "Owner");
    assert_eq!(json["removed"][0], a.get());
}
