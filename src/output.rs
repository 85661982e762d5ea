use std::{fs::File, io::prelude::*};

use anyhow::Result;
use clap::ValueEnum;
use serde::{Deserialize, Serialize};

/// Converts vec into comma separated string for tabled output
pub fn tabled_vec_to_string(v: &[String]) -> String {
  v.join(", ")
}

#[derive(Clone, Copy, Debug, Default, ValueEnum, Serialize, Deserialize)]
pub enum Format {
  /// JSON format used for logging or writing to a *.json file
  Json,
  /// Text format used for writing to stdout
  #[default]
  Text,
}

/// Write rendered output to stdout or the given file
pub fn write(output: &str, filename: &Option<String>) -> Result<()> {
  match filename {
    Some(filename) => {
      let mut file = File::create(filename)?;
      file.write_all(output.as_bytes())?;
    }
    None => {
      println!("{output}");
    }
  }

  Ok(())
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn tabled_vec_joins_with_commas() {
    let v = vec!["a".to_string(), "b".to_string()];
    assert_eq!(tabled_vec_to_string(&v), "a, b");
  }

  #[test]
  fn write_to_file() {
    let tmp = tempfile::tempdir().unwrap();
    let path = tmp.path().join("out.txt");
    write("hello", &Some(path.to_str().unwrap().to_string())).unwrap();
    assert_eq!(std::fs::read_to_string(&path).unwrap(), "hello");
  }
}
