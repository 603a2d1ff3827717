// Columns: label | api | assembly | middleware | scada_import

pub(super) const GATEWAY: &[&[&str]] = &[
    &["Id do gateway", "id", "id_gtw", "", ""],
    &["Nome do gateway", "name", "name_gtw", "xid_gateway", ""],
    &["IP do gateway", "ip", "ip_gtw", "host", ""],
    &["Gateway ativo", "active", "active_gtw", "status", ""],
    &["Id da subestacao", "substationId", "substationId_gtw", "", ""],
    &["Criado em", "createdAt", "createdAt_gtw", "", ""],
    &["Atualizado em", "updatedAt", "updatedAt_gtw", "", ""],
    &["Id da subestacao (ref)", "substation.id", "id_sub", "id_sub", ""],
    &["Nome da subestacao", "substation.name", "name_sub", "subestacao", ""],
    &["Subestacao ativa", "substation.active", "active_sub", "", ""],
    &["Regional", "substation.sapAbbreviation", "sapAbbreviation_sub", "regional", ""],
];

pub(super) const HARDWARE: &[&[&str]] = &[
    &["Id do hardware", "id", "id_hdw", "", ""],
    &["Nome do hardware", "name", "name_hdw", "", ""],
    &["Codigo SAP", "sapId", "sapId_hdw", "sap_id", ""],
    &["Tipo do hardware", "type", "type_hdw", "type", ""],
    &["Modelo do hardware", "model", "model_hdw", "", ""],
    &["Hardware ativo", "active", "active_hdw", "", ""],
    &["Id do gateway", "cmaGatewayId", "cmaGatewayId_hdw", "", ""],
    &["Criado em", "createdAt", "createdAt_hdw", "", ""],
    &["Atualizado em", "updatedAt", "updatedAt_hdw", "", ""],
    &["Id do gateway (ref)", "cmaGateway.id", "id_cma", "", ""],
    &["Nome do gateway (ref)", "cmaGateway.name", "name_cma", "", ""],
    &["IP do gateway (ref)", "cmaGateway.ip", "ip_cma", "", ""],
    &["Gateway ativo (ref)", "cmaGateway.active", "active_cma", "", ""],
];

pub(super) const SENSOR_MODBUS: &[&[&str]] = &[
    &["Id do sensor", "id", "id_sen", "xid_equip", "xid_equip"],
    &["Nome do sensor", "name", "name_sen", "", ""],
    &["Descricao do sensor", "description", "description_sen", "", ""],
    &["Modelo", "model", "model_sen", "modelo", ""],
    &["IP", "ip", "ip_sen", "host", "host"],
    &["Porta", "port", "port_sen", "port", "port"],
    &["Tipo", "type", "type_sen", "type", ""],
    &["Tentativas", "attempts", "attempts_sen", "retries", "retries"],
    &["Tempo limite", "timeLimit", "timeLimit_sen", "timeout", "timeout"],
    &["Periodo de atualizacao", "actualizationPeriod", "actualizationPeriod_sen", "updatePeriodType", "updatePeriodType"],
    &["Tempo de atualizacao", "actualizationTime", "actualizationTime_sen", "updatePeriods", "updatePeriods"],
    &["Max leitura de registradores", "maxRegisterRead", "maxRegisterRead_sen", "maxReadRegisterCount", "maxReadRegisterCount"],
    &["Max escrita de registradores", "maxRegisterWrite", "maxRegisterWrite_sen", "maxWriteRegisterCount", "maxWriteRegisterCount"],
    &["Max leitura de bits", "maxRegisterBitsRead", "maxRegisterBitsRead_sen", "maxReadBitCount", "maxReadBitCount"],
    &["Sensor ativo", "active", "active_sen", "enabled", "enabled"],
    &["Id do hardware", "hardwareId", "hardwareId_sen", "", ""],
    &["Id do fabricante", "manufacturer.id", "id_man", "", ""],
    &["Fabricante", "manufacturer.name", "name_man", "fabricante", ""],
    &["Fabricante ativo", "manufacturer.active", "active_man", "", ""],
    &["Tags do sensor", "tags", "tags_sen", "", ""],
];

pub(super) const REGISTER_MODBUS: &[&[&str]] = &[
    &["Id do registrador", "id", "id_reg_mod", "xid_sensor", "xid_sensor"],
    &["Nome do registrador", "name", "name_reg_mod", "nome", "nome"],
    &["Descricao do registrador", "description", "description_reg_mod", "", ""],
    &["Endereco do escravo", "addressSlave", "addressSlave_reg_mod", "slaveId", "slaveId"],
    &["Endereco do registrador", "addressRegister", "addressRegister_reg_mod", "offset", "offset"],
    &["Tipo Modbus", "registerModbusType", "registerModbusType_reg_mod", "range", "range"],
    &["Formato do dado", "registerDataFormat", "registerDataFormat_reg_mod", "modbusDataType", "modbusDataType"],
    &["Bit", "bit", "bit_reg_mod", "bit", "bit"],
    &["Multiplicador", "multiplier", "multiplier_reg_mod", "multiplier", "multiplier"],
    &["Aditivo", "additive", "additive_reg_mod", "additive", "additive"],
    &["Registrador ativo", "active", "active_reg_mod", "enabled", "enabled"],
    &["Id do sensor", "sensorModbusId", "sensorModbusId_reg_mod", "", ""],
    &["Id do tipo de registrador", "registerType.id", "id_reg_reg_mod", "", ""],
    &["Tipo de registrador", "registerType.name", "name_reg_reg_mod", "classificacao", ""],
    &["Id do tipo de sensor", "sensorType.id", "id_sen_reg_mod", "", ""],
    &["Tipo de sensor", "sensorType.name", "name_sen_reg_mod", "tipo", ""],
    &["Tags do registrador", "tags", "tags_reg_mod", "", ""],
];

pub(super) const SENSOR_DNP3: &[&[&str]] = &[
    &["Id do sensor", "id", "id_sen_dnp3", "xid_equip", "xid_equip"],
    &["Nome do sensor", "name", "name_sen_dnp3", "", ""],
    &["Descricao do sensor", "description", "description_sen_dnp3", "", ""],
    &["Modelo", "model", "model_sen_dnp3", "modelo", ""],
    &["IP", "ip", "ip_sen_dnp3", "host", "host"],
    &["Porta", "port", "port_sen_dnp3", "port", "port"],
    &["Tipo", "type", "type_sen_dnp3", "type", ""],
    &["Tentativas", "attempts", "attempts_sen_dnp3", "retries", "retries"],
    &["Tempo limite", "timeLimit", "timeLimit_sen_dnp3", "timeout", ""],
    &["Periodo de eventos", "actualizationPeriod", "actualizationPeriod_sen_dnp3", "eventsPeriodType", "eventsPeriodType"],
    &["Periodo RBE", "pollRbePeriod", "pollRbePeriod_sen_dnp3", "rbePollPeriods", "rbePollPeriods"],
    &["Periodo estatico", "pollStaticPeriod", "pollStaticPeriod_sen_dnp3", "staticPollPeriods", "staticPollPeriods"],
    &["Endereco de origem", "addressSource", "addressSource_sen_dnp3", "sourceAddress", "sourceAddress"],
    &["Endereco do escravo", "addressSlave", "addressSlave_sen_dnp3", "slaveAddress", "slaveAddress"],
    &["Sensor ativo", "active", "active_sen_dnp3", "enabled", "enabled"],
    &["Id do hardware", "hardwareId", "hardwareId_sen_dnp3", "", ""],
    &["Id do fabricante", "manufacturer.id", "id_man_dnp3", "", ""],
    &["Fabricante", "manufacturer.name", "name_man_dnp3", "fabricante", ""],
    &["Tags do sensor", "tags", "tags_sen_dnp3", "", ""],
];

pub(super) const REGISTER_DNP3: &[&[&str]] = &[
    &["Id do registrador", "id", "id_reg_dnp3", "xid_sensor", "xid_sensor"],
    &["Nome do registrador", "name", "name_reg_dnp3", "nome", ""],
    &["Descricao do registrador", "description", "description_reg_dnp3", "classificacao", ""],
    &["Indice", "index", "index_reg_dnp3", "index", "index"],
    &["Tempo ligado", "timeOn", "timeOn_reg_dnp3", "timeon", "timeon"],
    &["Tempo desligado", "timeOff", "timeOff_reg_dnp3", "timeoff", "timeoff"],
    &["Tipo de dado DNP3", "registerDataType", "registerDataType_reg_dnp3", "dnp3DataType", "dnp3DataType"],
    &["Comando de controle", "registerControlCommand", "registerControlCommand_reg_dnp3", "controlCommand", "controlCommand"],
    &["Registrador ativo", "active", "active_reg_dnp3", "enabled", "enabled"],
    &["Id do sensor", "sensorDnpId", "sensorDnpId_reg_dnp3", "", ""],
    &["Id do tipo de registrador", "registerType.id", "id_reg_reg_dnp3", "", ""],
    &["Tipo de registrador", "registerType.name", "name_reg_reg_dnp3", "classificacao", ""],
    &["Id do tipo de sensor", "sensorType.id", "id_sen_reg_dnp3", "", ""],
    &["Tipo de sensor", "sensorType.name", "name_sen_reg_dnp3", "tipo", ""],
    &["Tags do registrador", "tags", "tags_reg_dnp3", "", ""],
];
