use anyhow::Result;
use presenton_kernel::schools::{builtin_updates, import_csv, UniversityDirectory, SNAPSHOT_FILE};

const MINISTRY_CSV: &str = "\u{feff}序号,学校名称,学校标识码,主管部门,所在地,办学层次,备注\n\
1,浙江工业大学,4133010337.0,浙江省,杭州市,本科,\n\
2,宁波大学,4133011646,浙江省,宁波市,本科,\n\
3,浙江工业大学,4133010337,浙江省,杭州市,本科,\n";

#[test]
fn snapshot_survives_reopen_and_clear_removes_it() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let snapshot = dir.path().join(SNAPSHOT_FILE);

    let mut directory = UniversityDirectory::open_in(dir.path())?;
    assert!(directory.is_empty());
    assert_eq!(import_csv(&mut directory, MINISTRY_CSV.as_bytes())?, 2);
    let changes = directory.apply_updates(&builtin_updates());
    assert!(changes > 0);
    directory.save()?;
    assert!(snapshot.is_file());

    let mut reopened = UniversityDirectory::open_in(dir.path())?;
    assert_eq!(reopened.len(), directory.len());
    let zjut = reopened.get_by_name("浙江工业大学").cloned().unwrap_or_default();
    assert_eq!(zjut.id, 1);
    assert_eq!(zjut.code.as_deref(), Some("4133010337"));
    assert!(zjut.alias.is_some());
    let hits = reopened.search(zjut.alias.as_deref().unwrap_or_default(), 5)?;
    assert_eq!(hits[0].name, "浙江工业大学");

    reopened.clear()?;
    assert!(reopened.is_empty());
    assert!(!snapshot.exists());
    assert!(UniversityDirectory::open_in(dir.path())?.is_empty());
    Ok(())
}
