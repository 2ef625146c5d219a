use crate::cli_args::TreeArgs;
use crate::output::{print_json, write_to_stdout};
use crate::{Session, apply_selection_opts, scan_project};
use anyhow::Result;
use codepack_core::FolderTree;

pub fn handle_tree_command(args: &TreeArgs, session: &mut Session, _quiet: bool) -> Result<()> {
    let (root, mut scanner) = scan_project(session, &args.scan)?;
    apply_selection_opts(session, &mut scanner, &root, &args.selection)?;

    let tree = FolderTree::build(&root, scanner.files());
    if args.format.is_json() {
        print_json(&tree.to_nested())
    } else {
        write_to_stdout(&tree.render())
    }
}
