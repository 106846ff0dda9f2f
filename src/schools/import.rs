use std::collections::HashMap;
use std::io::Read;

use anyhow::{anyhow, Result};
use csv::{StringRecord, Trim};

use crate::schools::{University, UniversityDirectory, UniversityUpdate};

const COLUMN_NAME: &str = "学校名称";
const COLUMN_CODE: &str = "学校标识码";
const COLUMN_DEPARTMENT: &str = "主管部门";
const COLUMN_LOCATION: &str = "所在地";
const COLUMN_LEVEL: &str = "办学层次";
const COLUMN_CATEGORY: &str = "备注";

/// Spreadsheet exports turn identifier codes into floats (`4111010001.0`).
pub fn normalise_code(raw: &str) -> String {
    let trimmed = raw.trim();
    if let Some((whole, fraction)) = trimmed.split_once('.') {
        let numeric = !whole.is_empty() && whole.bytes().all(|b| b.is_ascii_digit());
        if numeric && fraction.bytes().all(|b| b == b'0') {
            return whole.to_string();
        }
    }
    trimmed.to_string()
}

fn optional(value: &str) -> Option<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

/// Reads the ministry list format and inserts every unknown name. Returns how
/// many universities were added.
pub fn import_csv<R: Read>(directory: &mut UniversityDirectory, reader: R) -> Result<usize> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .trim(Trim::All)
        .from_reader(reader);

    let columns: HashMap<String, usize> = reader
        .headers()?
        .iter()
        .enumerate()
        .map(|(idx, name)| (name.trim_start_matches('\u{feff}').trim().to_string(), idx))
        .collect();
    if !columns.contains_key(COLUMN_NAME) {
        return Err(anyhow!("CSV header is missing the `{COLUMN_NAME}` column"));
    }
    let cell = |record: &StringRecord, column: &str| -> String {
        columns
            .get(column)
            .and_then(|idx| record.get(*idx))
            .unwrap_or("")
            .to_string()
    };

    let mut imported = 0;
    for record in reader.records() {
        let record = record?;
        let name = cell(&record, COLUMN_NAME);
        if name.trim().is_empty() {
            continue;
        }
        let code = normalise_code(&cell(&record, COLUMN_CODE));
        let university = University {
            name: name.trim().to_string(),
            code: optional(&code),
            department: optional(&cell(&record, COLUMN_DEPARTMENT)),
            location: optional(&cell(&record, COLUMN_LOCATION)),
            level: optional(&cell(&record, COLUMN_LEVEL)),
            category: optional(&cell(&record, COLUMN_CATEGORY)),
            ..University::default()
        };
        if directory.insert(university) {
            imported += 1;
        }
    }
    Ok(imported)
}

const BUILTIN: &[(&str, &str, &str, Option<&str>)] = &[
    ("浙江大学", "4133010335", "杭州", Some("zju")),
    ("浙江工业大学", "4133010337", "杭州", Some("zjut")),
    ("杭州电子科技大学", "4133010336", "杭州", Some("hdu")),
    ("浙江科技大学", "4133011057", "杭州", Some("zust")),
    ("浙江理工大学", "4133010338", "杭州", None),
    ("宁波大学", "4133011646", "宁波", None),
    ("浙江工商大学", "4133010353", "杭州", None),
    ("温州医科大学", "4133010343", "温州", None),
    ("浙江中医药大学", "4133010344", "杭州", None),
    ("中国计量大学", "4133010356", "杭州", None),
    ("浙江师范大学", "4133010345", "金华", None),
    ("杭州师范大学", "4133010346", "杭州", None),
    ("浙江农林大学", "4133010341", "杭州", None),
    ("浙江海洋大学", "4133010340", "舟山", None),
    ("浙江传媒学院", "4133011482", "杭州", None),
    ("浙江财经大学", "4133011483", "杭州", None),
    ("嘉兴大学", "4133010354", "嘉兴", None),
    ("绍兴文理学院", "4133010349", "绍兴", None),
    ("台州学院", "4133010350", "台州", None),
    ("丽水学院", "4133010352", "丽水", None),
    ("衢州学院", "4133011488", "衢州", None),
    ("湖州师范学院", "4133010347", "湖州", None),
    ("温州大学", "4133010351", "温州", None),
    ("浙江外国语学院", "4133014275", "杭州", None),
    ("浙江树人学院", "4133011842", "杭州", None),
    ("浙江越秀外国语学院", "4133012792", "绍兴", None),
    ("宁波工程学院", "4133011058", "宁波", None),
    ("杭州医学院", "4133011647", "杭州", None),
    ("浙大城市学院", "4133013021", "杭州", None),
    ("浙大宁波理工学院", "4133013022", "宁波", None),
    ("北京大学", "4111010001", "北京", Some("pku")),
    ("清华大学", "4111010003", "北京", Some("tsinghua")),
    ("复旦大学", "4131010246", "上海", Some("fudan")),
    ("上海交通大学", "4131010248", "上海", Some("sjtu")),
];

/// The curated list the template matcher relies on (aliases such as `zju`).
pub fn builtin_updates() -> Vec<UniversityUpdate> {
    BUILTIN
        .iter()
        .map(|(name, code, location, alias)| UniversityUpdate {
            name: name.to_string(),
            code: Some(code.to_string()),
            location: Some(location.to_string()),
            alias: alias.map(String::from),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalises_float_codes() {
        assert_eq!(normalise_code("4111010001.0"), "4111010001");
        assert_eq!(normalise_code(" 4133010335 "), "4133010335");
        assert_eq!(normalise_code("12.5"), "12.5");
        assert_eq!(normalise_code(""), "");
    }

    #[test]
    fn imports_ministry_rows() {
        let csv = "\u{feff}序号,学校名称,学校标识码,主管部门,所在地,办学层次,备注\n\
                   1,北京大学,4111010001.0,教育部,北京市,本科,\n\
                   2,,4111010002,教育部,北京市,本科,\n\
                   3,清华大学,4111010003,教育部,北京市,本科,\n\
                   4,北京大学,4111010001,教育部,北京市,本科,\n";
        let mut directory = UniversityDirectory::in_memory();
        assert_eq!(import_csv(&mut directory, csv.as_bytes()).unwrap(), 2);

        let pku = directory.get_by_name("北京大学").unwrap();
        assert_eq!(pku.code.as_deref(), Some("4111010001"));
        assert_eq!(pku.department.as_deref(), Some("教育部"));
        assert_eq!(pku.category, None);
    }

    #[test]
    fn rejects_foreign_headers() {
        let mut directory = UniversityDirectory::in_memory();
        assert!(import_csv(&mut directory, "name,code\nPKU,1\n".as_bytes()).is_err());
    }

    #[test]
    fn builtin_list_has_aliases() {
        let updates = builtin_updates();
        assert_eq!(updates.len(), 34);
        assert!(updates
            .iter()
            .any(|u| u.name == "浙江工业大学" && u.alias.as_deref() == Some("zjut")));
    }
}
