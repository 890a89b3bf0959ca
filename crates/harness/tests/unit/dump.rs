//! # Dump Region Tests
//!
//! Section layout offsets, save/load emission, extraction from a raw
//! memory image, and the window digests.

use crate::common::test_config;
use rvvfuzz_core::state::MachineState;
use rvvfuzz_core::state::dump::DumpFile;

/// Little-endian u64 store into the image.
fn put_u64(image: &mut [u8], offset: usize, value: u64) {
    image[offset..offset + 8].copy_from_slice(&value.to_le_bytes());
}

#[test]
fn layout_offsets_for_rv64_dv() {
    let dir = tempfile::tempdir().expect("tempdir");
    let config = test_config(dir.path());
    let dump = DumpFile::new(&config).expect("layout");

    assert_eq!(dump.addr(), 0x8000_1000);

    // tmpregs at 0, estate at 24, fcsr at 48
    assert!(dump.tmpregs.emit_save().contains("sd x5, 0(gp)"));
    assert!(dump.tmpregs.emit_save().contains("sd x7, 16(gp)"));
    assert!(dump.estate.emit_save().contains("sd x5, 24(gp)"));
    assert!(dump.estate.emit_load().contains("ld x7, 40(gp)"));
    let fstate = dump.fstate.as_ref().expect("fstate");
    assert!(fstate.emit_save().contains("sd x5, 48(gp)"));

    // FP images pad up to the next flen boundary: 56 -> 64
    let fregs = dump.fregs.as_ref().expect("fregs");
    assert!(fregs.emit_save().contains("fsd f0, 64(gp)"));
    assert!(fregs.emit_save().contains("fsd f31, 312(gp)"));

    // vector CSR block follows at 320, register images at 376
    let vstate = dump.vstate.as_ref().expect("vstate");
    assert!(vstate.emit_save().contains("sd x5, 320(gp)"));
    assert!(vstate.emit_save().contains("sd x11, 368(gp)"));
    let vregs = dump.vregs.as_ref().expect("vregs");
    let save = vregs.emit_save();
    assert!(save.starts_with("    vsetvli t0, zero, e8, m1, ta, ma"));
    assert!(save.contains("addi t0, gp, 376"));
    assert!(save.contains("vs1r.v v31, (t0)"));

    // 376 + 32 * 16 bytes of vector registers
    assert_eq!(dump.len(), 888);
}

#[test]
fn estate_set_emits_literals() {
    let dir = tempfile::tempdir().expect("tempdir");
    let config = test_config(dir.path());
    let dump = DumpFile::new(&config).expect("layout");
    let code = dump.estate.emit_set(&[0, 0, 0]);
    assert_eq!(code.matches("li x").count(), 3);
    assert!(code.contains("li x5, 0x0"));
}

#[test]
fn reserve_too_small_is_rejected() {
    let dir = tempfile::tempdir().expect("tempdir");
    let mut config = test_config(dir.path());
    config.memory.dumpfile_reserve = 64;
    assert!(DumpFile::new(&config).is_err());
}

#[test]
fn extraction_reconstructs_the_state() {
    let dir = tempfile::tempdir().expect("tempdir");
    let config = test_config(dir.path());
    let dump = DumpFile::new(&config).expect("layout");

    let mut image = vec![0u8; config.memory.memlen as usize];
    let base = (dump.addr() - config.memory.memstart) as usize;

    // estate: lastPC, #exceptions, mstatus & 0x6600
    put_u64(&mut image, base + 24, 0x8000_0040);
    put_u64(&mut image, base + 32, 1);
    put_u64(&mut image, base + 40, 0x6600);
    // fcsr
    put_u64(&mut image, base + 48, 0xa0);
    // f3 image
    image[base + 64 + 3 * 8] = 0xde;
    // vstate: vtype, vl, vlenb, vstart, vxrm, vxsat, vcsr
    put_u64(&mut image, base + 320, 5);
    put_u64(&mut image, base + 328, 3);
    put_u64(&mut image, base + 336, 16);
    put_u64(&mut image, base + 344, 0);
    put_u64(&mut image, base + 352, 1);
    put_u64(&mut image, base + 360, 0);
    put_u64(&mut image, base + 368, 2);
    // v31 image
    image[base + 376 + 31 * 16] = 0x7f;

    let extras = dump.extract(&image).expect("extract");
    assert_eq!(extras.last_pc, 0x8000_0040);
    assert_eq!(extras.exceptions, 1);
    assert_eq!(extras.mstatus_fs_vs, 0x6600);

    let float = extras.float.as_ref().expect("float");
    assert_eq!(float.fcsr, 0xa0);
    assert_eq!(float.fregs[3][0], 0xde);
    assert_eq!(float.fregs[3].len(), 8);

    let vector = extras.vector.as_ref().expect("vector");
    assert_eq!(vector.vtype, 5);
    assert_eq!(vector.vl, 3);
    assert_eq!(vector.vlenb, 16);
    assert_eq!((vector.vxrm, vector.vxsat, vector.vcsr), (1, 0, 2));
    assert_eq!(vector.vregs[31][0], 0x7f);

    assert_eq!(extras.xmemhash.len(), 40);
    assert_eq!(extras.dmemhash.len(), 40);

    // a consistent capture assembles into a full machine state
    let state = MachineState::from_capture([0; 32], 0x8000_0004, extras).expect("capture");
    assert_eq!(state.pc, Some(0x8000_0004));
}

#[test]
fn digests_track_their_windows() {
    let dir = tempfile::tempdir().expect("tempdir");
    let config = test_config(dir.path());
    let dump = DumpFile::new(&config).expect("layout");
    let image = vec![0u8; config.memory.memlen as usize];
    let baseline = dump.extract(&image).expect("extract");

    // a data-window byte changes only dmemhash
    let mut data_flip = image.clone();
    data_flip[(config.memory.dmemstart - config.memory.memstart) as usize] = 1;
    let extras = dump.extract(&data_flip).expect("extract");
    assert_eq!(extras.xmemhash, baseline.xmemhash);
    assert_ne!(extras.dmemhash, baseline.dmemhash);

    // a text-window byte changes only xmemhash
    let mut text_flip = image.clone();
    text_flip[4] = 1;
    let extras = dump.extract(&text_flip).expect("extract");
    assert_ne!(extras.xmemhash, baseline.xmemhash);
    assert_eq!(extras.dmemhash, baseline.dmemhash);

    // the dump region itself is excluded from xmemhash
    let mut dump_flip = image;
    dump_flip[(dump.addr() - config.memory.memstart) as usize] = 1;
    let extras = dump.extract(&dump_flip).expect("extract");
    assert_eq!(extras.xmemhash, baseline.xmemhash);
}

#[test]
fn inconsistent_vcsr_is_rejected() {
    let dir = tempfile::tempdir().expect("tempdir");
    let config = test_config(dir.path());
    let dump = DumpFile::new(&config).expect("layout");

    let mut image = vec![0u8; config.memory.memlen as usize];
    let base = (dump.addr() - config.memory.memstart) as usize;
    // vxrm = 1 but vcsr = 0
    put_u64(&mut image, base + 352, 1);
    let extras = dump.extract(&image).expect("extract");
    assert!(MachineState::from_capture([0; 32], 0, extras).is_err());
}

#[test]
fn short_image_is_an_error() {
    let dir = tempfile::tempdir().expect("tempdir");
    let config = test_config(dir.path());
    let dump = DumpFile::new(&config).expect("layout");
    let image = vec![0u8; 64];
    assert!(dump.extract(&image).is_err());
}
