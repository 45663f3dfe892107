use std::io::ErrorKind;
use std::path::Path;

pub(crate) fn read_master_profile(path: &Path) -> String {
    match std::fs::read_to_string(path) {
        Ok(text) => text,
        Err(err) if err.kind() == ErrorKind::NotFound => {
            "❌ master_profile.txt が見つかりません。".to_string()
        }
        Err(err) => format!("❌ マスター情報取得中にエラー: {err}"),
    }
}
