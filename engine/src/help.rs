//! Paged `/help` listing.

use crate::commands::{COMMAND_SPECS, CommandSpec};
use crate::console::Console;

/// Commands shown per help page.
pub const HELP_PAGE_SIZE: usize = 5;

/// Command specs sorted by name and split into pages.
#[must_use]
pub fn help_pages() -> Vec<Vec<&'static CommandSpec>> {
    let mut specs: Vec<&'static CommandSpec> = COMMAND_SPECS.iter().collect();
    specs.sort_by_key(|spec| spec.name);
    specs
        .chunks(HELP_PAGE_SIZE)
        .map(<[&CommandSpec]>::to_vec)
        .collect()
}

fn render_page(console: &mut dyn Console, page: &[&CommandSpec], number: usize, total: usize) {
    console.clear();
    console.notice(&format!("Available commands (Page {number} of {total}):"));
    let width = page.iter().map(|s| s.name.len()).max().unwrap_or(0);
    for spec in page {
        console.raw(&format!("  {:<width$} - {}", spec.name, spec.description));
    }
}

/// Show the help pages until the user quits.
///
/// `n` and `p` move between pages; `q` or end of input leaves.
pub(crate) fn run_help(console: &mut dyn Console) {
    let pages = help_pages();
    let total = pages.len();
    let mut current = 0;

    loop {
        render_page(console, &pages[current], current + 1, total);
        let mut options = Vec::new();
        if current + 1 < total {
            options.push("(n)ext");
        }
        if current > 0 {
            options.push("(p)revious");
        }
        options.push("(q)uit");
        console.raw(&format!("\nOptions: {}", options.join(", ")));

        let Some(choice) = console.prompt("Help Menu > ") else {
            break;
        };
        match choice.trim().to_ascii_lowercase().as_str() {
            "n" if current + 1 < total => current += 1,
            "p" if current > 0 => current -= 1,
            "q" => break,
            _ => console.error("Invalid option."),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::ScriptedConsole;

    #[test]
    fn pages_are_sorted_and_sized() {
        let pages = help_pages();
        assert!(pages.iter().all(|p| p.len() <= HELP_PAGE_SIZE));
        let names: Vec<&str> = pages.iter().flatten().map(|s| s.name).collect();
        let mut sorted = names.clone();
        sorted.sort_unstable();
        assert_eq!(names, sorted);
        assert_eq!(names.len(), COMMAND_SPECS.len());
        assert_eq!(names[0], "/add");
    }

    #[test]
    fn navigation_moves_between_pages_and_quits() {
        let mut console = ScriptedConsole::with_inputs(&["n", "p", "x", "q"]);
        run_help(&mut console);

        let total = help_pages().len();
        let headers: Vec<String> = console
            .notices()
            .into_iter()
            .filter(|n| n.starts_with("Available commands"))
            .map(ToString::to_string)
            .collect();
        let expected: Vec<String> = [1, 2, 1, 1]
            .iter()
            .map(|page| format!("Available commands (Page {page} of {total}):"))
            .collect();
        assert_eq!(headers, expected);
        assert!(console.errors().contains(&"Invalid option."));
    }

    #[test]
    fn end_of_input_leaves_help() {
        let mut console = ScriptedConsole::default();
        run_help(&mut console);
        assert_eq!(console.prompts().len(), 1);
    }

    #[test]
    fn previous_on_first_page_is_invalid() {
        let mut console = ScriptedConsole::with_inputs(&["p", "q"]);
        run_help(&mut console);
        assert!(console.errors().contains(&"Invalid option."));
        assert_eq!(console.prompts().len(), 2);
    }
}
