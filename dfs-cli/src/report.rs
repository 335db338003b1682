use std::io::Write;

use dfs::{NodeSummary, VolumeInfo};

use crate::CliError;

/// Prints the header summary followed by one block per entry.
pub fn write_listing<W, I>(out: &mut W, info: &VolumeInfo, entries: I) -> Result<(), CliError>
where
    W: Write,
    I: IntoIterator<Item = dfs::Result<NodeSummary>>,
{
    writeln!(out, "--------------[ DFS ]--------------")?;
    if info.volume_offset != 0 {
        writeln!(out, "Volume offset: +{}", info.volume_offset)?;
    }
    writeln!(out, "DFS Version: v{}.{}", info.version_major, info.version_minor)?;
    writeln!(out, "Root block: +{}", info.root_offset)?;
    writeln!(out, "Bitmap granularity: +{}", info.granularity)?;
    writeln!(out, "Size of partition: {} bytes", info.partition_size)?;
    writeln!(out, "Free granules: {}/{}", info.free_granules, info.granules)?;
    writeln!(out, "Mirror partition? {}", yes_no(info.has_mirror()))?;
    writeln!(out, "Journaling? {}", yes_no(info.has_journal()))?;

    writeln!(out, "--- Start of file listing ---")?;
    for entry in entries {
        let entry = entry?;
        writeln!(out, "------------------")?;
        writeln!(out, "Node: {}", entry.name)?;
        writeln!(out, "Size: {}", entry.file_size)?;
        writeln!(out, "U/G perms: {:o} {:o}", entry.user_perms, entry.group_perms)?;
        writeln!(out, "Access: {}", entry.accessed)?;
        writeln!(out, "Edition: {}", entry.edited)?;
        writeln!(out, "Creation: {}", entry.created)?;
    }
    writeln!(out, "--- End of file listing ---")?;
    Ok(())
}

fn yes_no(flag: bool) -> &'static str {
    if flag {
        "Yes"
    } else {
        "No"
    }
}
