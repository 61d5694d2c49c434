use crate::cdx::paths;

pub fn load_dotenv() {
    if dotenvy::dotenv().is_ok() {
        return;
    }

    let Some(path) = paths::dotenv_file() else {
        return;
    };
    if path.is_file() {
        let _ = dotenvy::from_path(&path);
    }
}
