use anyhow::bail;

/// Parses bookmark index arguments: each item is `N` or an inclusive range
/// `N-M` with `1 <= N <= M`. Items may also be separated by whitespace
/// inside one argument. The result keeps argument order without
/// duplicates.
pub fn parse_indices<S: AsRef<str>>(args: &[S]) -> anyhow::Result<Vec<i64>> {
    let mut ids = Vec::new();
    let mut push = |id: i64| {
        if !ids.contains(&id) {
            ids.push(id);
        }
    };

    for item in args.iter().flat_map(|a| a.as_ref().split_whitespace()) {
        match item.split_once('-') {
            None => push(parse_index(item)?),
            Some((start, end)) => {
                let (start, end) = (parse_index(start)?, parse_index(end)?);
                if start > end {
                    bail!("Index is not valid: {item}");
                }
                (start..=end).for_each(&mut push);
            }
        }
    }

    Ok(ids)
}

fn parse_index(raw: &str) -> anyhow::Result<i64> {
    match raw.parse::<i64>() {
        Ok(index) if index >= 1 => Ok(index),
        _ => bail!("Index is not valid: {raw}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn singles_and_ranges() {
        assert_eq!(parse_indices(&["1-3", "7", "9"]).unwrap(), vec![1, 2, 3, 7, 9]);
        assert_eq!(parse_indices(&["5 6 23"]).unwrap(), vec![5, 6, 23]);
        assert_eq!(parse_indices(&["2", "1-3"]).unwrap(), vec![2, 1, 3]);
        assert_eq!(parse_indices(&["4-4"]).unwrap(), vec![4]);
    }

    #[test]
    fn empty_means_all() {
        assert!(parse_indices::<&str>(&[]).unwrap().is_empty());
    }

    #[test]
    fn rejects_bad_items() {
        for bad in ["0", "-1", "3-1", "a", "1-2-3", "1-", "2.5"] {
            assert!(parse_indices(&[bad]).is_err(), "{bad} should be rejected");
        }
    }
}
