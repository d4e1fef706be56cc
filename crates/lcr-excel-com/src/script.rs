//! The PowerShell control script run for every automation job.

/// Copies the extract block into the target sheet through Excel COM.
///
/// Workbooks are always closed without saving back to the inputs and Excel is
/// always quit, whether or not the copy succeeded. The Excel process id is
/// written to `-PidFile` as soon as Excel starts so the caller can terminate
/// it if the script itself has to be killed.
pub const CONTROL_SCRIPT: &str = r#"
param(
  [string]$TemplatePath,
  [string]$InputPath,
  [string]$OutputPath,
  [double]$DateSerial,
  [string]$SheetName,
  [string]$ClearRange,
  [string]$TargetAnchor,
  [string]$DateCell,
  [int]$FirstRow,
  [int]$FirstColumn,
  [int]$ColumnCount,
  [string]$PidFile
)

$ErrorActionPreference = "Stop"

$excel = $null
$wbTemplate = $null
$wbInput = $null
$xlUp = -4162
$xlOpenXMLWorkbook = 51

Add-Type -Namespace Lcr -Name Win32 -MemberDefinition @'
[DllImport("user32.dll")]
public static extern int GetWindowThreadProcessId(IntPtr hWnd, out int lpdwProcessId);
'@

try {
  $excel = New-Object -ComObject Excel.Application
  $excel.Visible = $false
  $excel.DisplayAlerts = $false

  if ($PidFile) {
    $excelPid = 0
    [void][Lcr.Win32]::GetWindowThreadProcessId([IntPtr]$excel.Hwnd, [ref]$excelPid)
    Set-Content -LiteralPath $PidFile -Value $excelPid
  }

  $wbTemplate = $excel.Workbooks.Open($TemplatePath)
  $wsTarget = $wbTemplate.Worksheets.Item($SheetName)

  $wbInput = $excel.Workbooks.Open($InputPath)
  $wsInput = $wbInput.Worksheets.Item(1)

  $wsTarget.Range($ClearRange).ClearContents()

  $lastColumn = $FirstColumn + $ColumnCount - 1
  $lastRow = $FirstRow - 1
  foreach ($col in $FirstColumn..$lastColumn) {
    $candidate = $wsInput.Cells($wsInput.Rows.Count, $col).End($xlUp).Row
    if ($candidate -gt $lastRow) {
      $lastRow = $candidate
    }
  }

  if ($lastRow -ge $FirstRow) {
    $src = $wsInput.Range($wsInput.Cells($FirstRow, $FirstColumn), $wsInput.Cells($lastRow, $lastColumn))
    $dest = $wsTarget.Range($TargetAnchor).Resize($src.Rows.Count, $src.Columns.Count)
    $dest.Value2 = $src.Value2
  }

  $wsTarget.Range($DateCell).Value2 = $DateSerial

  $excel.CalculateFullRebuild()
  if (Test-Path -LiteralPath $OutputPath) {
    Remove-Item -LiteralPath $OutputPath -Force
  }
  $wbTemplate.SaveAs($OutputPath, $xlOpenXMLWorkbook)
}
finally {
  if ($wbInput -ne $null) { $wbInput.Close($false) }
  if ($wbTemplate -ne $null) { $wbTemplate.Close($false) }
  if ($excel -ne $null) {
    $excel.Quit() | Out-Null
    [void][System.Runtime.InteropServices.Marshal]::ReleaseComObject($excel)
  }
  [System.GC]::Collect()
  [System.GC]::WaitForPendingFinalizers()
}
"#;
