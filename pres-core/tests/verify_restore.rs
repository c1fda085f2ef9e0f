use pres_core::checksum::checksum;
use pres_core::conf::{read_confs, Conf};
use pres_core::layout::ShardLayout;
use pres_core::{
    create_archive, restore_archive, restore_archive_into, restore_archive_to_path,
    verify_archive, ArchiveOptions, ErrorKind, Health, PresError, Warning,
};
use std::fs::{self, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

fn make_archive(dir: &Path, len: usize, seed: u64) -> (PathBuf, Vec<u8>) {
    fastrand::seed(seed);
    let payload: Vec<u8> = (0..len).map(|_| fastrand::u8(..)).collect();
    let input = dir.join("payload.bin");
    fs::write(&input, &payload).unwrap();
    let archive = create_archive(&input, &ArchiveOptions::default()).unwrap();
    (archive, payload)
}

fn scribble(path: &Path, offset: u64, len: usize) {
    let mut f = OpenOptions::new().read(true).write(true).open(path).unwrap();
    let mut buf = vec![0u8; len];
    f.seek(SeekFrom::Start(offset)).unwrap();
    f.read_exact(&mut buf).unwrap();
    buf.iter_mut().for_each(|b| *b ^= 0xA5);
    f.seek(SeekFrom::Start(offset)).unwrap();
    f.write_all(&buf).unwrap();
}

/// Damages shard `i` of an archive laid out with the default options.
fn damage_shard(path: &Path, data_len: u64, i: usize) {
    let layout = ShardLayout::new(data_len, 100, 3);
    let len = layout.stored_len(i).min(8) as usize;
    scribble(path, layout.offset(i), len);
}

/// Replaces the metadata tail with three copies of an edited configuration.
fn rewrite_tail(archive: &Path, parity_end: u64, edit: impl FnOnce(&mut Conf)) {
    let mut conf = read_confs(archive).unwrap()[0].clone();
    edit(&mut conf);
    let mut bytes = fs::read(archive).unwrap();
    bytes.truncate(parity_end as usize);
    bytes.extend_from_slice(&conf.tail_bytes());
    fs::write(archive, bytes).unwrap();
}

#[test]
fn clean_archive_round_trips() {
    let td = tempfile::tempdir().unwrap();
    let (archive, payload) = make_archive(td.path(), 12_345, 1);

    let report = verify_archive(&archive, &ArchiveOptions::default()).unwrap();
    assert_eq!(report.health, Health::Healthy);
    assert_eq!(report.intact_shards, 103);
    assert_eq!(report.trusted_copies, 3);
    assert!(report.damaged_shards.is_empty());
    assert!(report.warnings.is_empty());

    let restored = restore_archive(&archive, &ArchiveOptions::default()).unwrap();
    let out = td.path().join("payload.bin");
    assert_eq!(restored.output.as_deref(), Some(out.as_path()));
    assert!(restored.repaired.is_empty());
    assert_eq!(fs::read(&out).unwrap(), payload);
    // restore never modifies the archive
    assert!(archive.exists());
}

#[test]
fn verify_is_read_only_and_repeatable() {
    let td = tempfile::tempdir().unwrap();
    let (archive, _) = make_archive(td.path(), 10_500, 2);
    damage_shard(&archive, 10_500, 7);
    let before = fs::read(&archive).unwrap();

    let first = verify_archive(&archive, &ArchiveOptions::default()).unwrap();
    let second = verify_archive(&archive, &ArchiveOptions::default()).unwrap();
    assert_eq!(first, second);
    assert_eq!(fs::read(&archive).unwrap(), before);
}

#[test]
fn restore_into_writer() {
    let td = tempfile::tempdir().unwrap();
    let (archive, payload) = make_archive(td.path(), 10_001, 3);
    let mut out = Vec::new();
    let report = restore_archive_into(&archive, &mut out, &ArchiveOptions::default()).unwrap();
    assert_eq!(report.output, None);
    assert_eq!(report.data_len, 10_001);
    assert_eq!(out, payload);
}

#[test]
fn repairs_data_short_and_parity_shards() {
    let td = tempfile::tempdir().unwrap();
    let len = 12_345u64;
    let (archive, payload) = make_archive(td.path(), len as usize, 4);
    damage_shard(&archive, len, 0);
    damage_shard(&archive, len, 99);
    damage_shard(&archive, len, 101);

    let report = verify_archive(&archive, &ArchiveOptions::default()).unwrap();
    assert_eq!(report.health, Health::Repairable);
    assert_eq!(report.damaged_shards, vec![0, 99, 101]);
    assert_eq!(report.warnings, vec![Warning::SomeShardsDamaged { damaged: 3 }]);
    report.ensure_recoverable().unwrap();

    let out = td.path().join("restored.bin");
    let restored = restore_archive_to_path(&archive, &out, &ArchiveOptions::default()).unwrap();
    assert_eq!(restored.repaired, vec![0, 99, 101]);
    assert_eq!(fs::read(&out).unwrap(), payload);
}

#[test]
fn small_buffer_repairs_the_same_way() {
    let td = tempfile::tempdir().unwrap();
    let len = 20_000u64;
    let (archive, payload) = make_archive(td.path(), len as usize, 5);
    damage_shard(&archive, len, 50);
    damage_shard(&archive, len, 102);

    let opts = ArchiveOptions { buffer_size: 7, ..Default::default() };
    let mut out = Vec::new();
    restore_archive_into(&archive, &mut out, &opts).unwrap();
    assert_eq!(out, payload);
}

#[test]
fn four_damaged_shards_are_unrecoverable() {
    let td = tempfile::tempdir().unwrap();
    let len = 10_000u64;
    let (archive, _) = make_archive(td.path(), len as usize, 6);
    for i in [3, 30, 60, 100] {
        damage_shard(&archive, len, i);
    }

    let report = verify_archive(&archive, &ArchiveOptions::default()).unwrap();
    assert_eq!(report.health, Health::Unrecoverable);
    assert_eq!(report.intact_shards, 99);
    let err = report.ensure_recoverable().unwrap_err();
    assert_eq!(err.kind(), ErrorKind::TooManyDamagedShards);

    let err = restore_archive(&archive, &ArchiveOptions::default()).unwrap_err();
    assert!(matches!(err, PresError::TooManyDamagedShards { intact: 99, required: 100 }));
    assert!(!td.path().join("payload.bin").exists());
    // nothing but the archive is left behind
    assert_eq!(fs::read_dir(td.path()).unwrap().count(), 1);
}

#[test]
fn existing_output_is_refused() {
    let td = tempfile::tempdir().unwrap();
    let (archive, _) = make_archive(td.path(), 10_000, 7);
    let out = td.path().join("taken.bin");
    fs::write(&out, b"keep me").unwrap();

    let err = restore_archive_to_path(&archive, &out, &ArchiveOptions::default()).unwrap_err();
    assert!(matches!(err, PresError::OutputExists(_)));
    assert_eq!(fs::read(&out).unwrap(), b"keep me");
}

#[test]
fn name_without_suffix_is_not_an_archive() {
    let td = tempfile::tempdir().unwrap();
    let (archive, _) = make_archive(td.path(), 10_000, 8);
    let renamed = td.path().join("payload.bin.bak");
    fs::rename(&archive, &renamed).unwrap();

    let err = restore_archive(&renamed, &ArchiveOptions::default()).unwrap_err();
    assert!(matches!(err, PresError::NotAnArchive(_)));
}

#[test]
fn parity_inconsistent_with_data_fails_reconstruction_check() {
    let td = tempfile::tempdir().unwrap();
    let len = 10_000u64;
    let (archive, _) = make_archive(td.path(), len as usize, 9);
    let layout = ShardLayout::new(len, 100, 3);

    // damage parity shard 102 and record the damaged bytes as its checksum
    damage_shard(&archive, len, 101);
    let bytes = fs::read(&archive).unwrap();
    let off = layout.offset(101) as usize;
    let crc = checksum(&bytes[off..off + layout.shard_size as usize]);
    rewrite_tail(&archive, layout.parity_end(), |c| c.shard_crc32cs[101] = crc);

    let report = verify_archive(&archive, &ArchiveOptions::default()).unwrap();
    assert_eq!(report.health, Health::Healthy);
    assert_eq!(report.trusted_copies, 3);

    let mut out = Vec::new();
    let err = restore_archive_into(&archive, &mut out, &ArchiveOptions::default()).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ReconstructionVerificationFailed);
    assert!(out.is_empty());

    let err = restore_archive(&archive, &ArchiveOptions::default()).unwrap_err();
    assert!(matches!(err, PresError::ReconstructionVerificationFailed { .. }));
    assert!(!td.path().join("payload.bin").exists());
    assert_eq!(fs::read_dir(td.path()).unwrap().count(), 1);
}
