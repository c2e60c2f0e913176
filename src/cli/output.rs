use crate::types::Bookmark;

/// Asks for confirmation unless `yes` was passed.
pub fn confirm_action(message: &str, yes: bool) -> anyhow::Result<bool> {
    if yes {
        return Ok(true);
    }
    Ok(inquire::Confirm::new(message)
        .with_default(false)
        .prompt()?)
}

pub fn print_bookmarks(bookmarks: &[Bookmark]) {
    for bookmark in bookmarks {
        let index = format!("{}. ", bookmark.id);
        let pad = " ".repeat(index.len());

        println!("{index}{}", bookmark.title);
        println!("{pad}> {}", bookmark.url);
        if !bookmark.excerpt.is_empty() {
            println!("{pad}+ {}", bookmark.excerpt);
        }
        if !bookmark.tags.is_empty() {
            let names: Vec<&str> = bookmark.tags.iter().map(|t| t.name.as_str()).collect();
            println!("{pad}# {}", names.join(", "));
        }
        println!();
    }
}

pub fn print_index_only(bookmarks: &[Bookmark]) {
    let ids: Vec<String> = bookmarks.iter().map(|b| b.id.to_string()).collect();
    println!("{}", ids.join(" "));
}
