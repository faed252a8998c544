/*!
 * Tests for glossary loading and matching
 */

use docbatch::translation::Glossary;

use crate::common::{SAMPLE_GLOSSARY_CSV, create_temp_dir, create_test_file};

#[test]
fn test_loadFromPaths_csvAndTsv_shouldMergeFirstWins() {
    let dir = create_temp_dir().unwrap();
    let csv = create_test_file(dir.path(), "terms.csv", SAMPLE_GLOSSARY_CSV).unwrap();
    let tsv = create_test_file(dir.path(), "extra.tsv", "heart\t心\nwaist circumference\t腰围\n").unwrap();

    let glossary = Glossary::load_from_paths(&[csv, tsv], true).unwrap();

    assert_eq!(glossary.len(), 4);
    assert_eq!(glossary.get("heart"), Some("心脏"));
    assert_eq!(glossary.get("waist circumference"), Some("腰围"));
    assert_eq!(glossary.get("source"), None);
}

#[test]
fn test_loadTable_quotedCellsAndBlankRows_shouldBeHandled() {
    let dir = create_temp_dir().unwrap();
    let path = create_test_file(
        dir.path(),
        "quoted.csv",
        "\"blood pressure, systolic\",收缩压\n,\nlonely\n\"Type 2 diabetes\",\"2型糖尿病\"\n",
    )
    .unwrap();

    let glossary = Glossary::load_table(&path, true).unwrap();

    assert_eq!(glossary.len(), 2);
    assert_eq!(glossary.get("blood pressure, systolic"), Some("收缩压"));
    assert_eq!(glossary.get("Type 2 diabetes"), Some("2型糖尿病"));
}

#[test]
fn test_loadFromPaths_missingFile_shouldFail() {
    let dir = create_temp_dir().unwrap();
    let result = Glossary::load_from_paths(&[dir.path().join("nope.csv")], true);
    assert!(result.is_err());
}

#[test]
fn test_findMatches_cjkNeighbours_shouldStillMatch() {
    let glossary = Glossary::from_pairs([("BMI", "体重指数")], true);
    let matches = glossary.find_matches("高BMI人群");
    assert_eq!(matches.len(), 1);
}
